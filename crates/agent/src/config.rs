//! Agent configuration
//!
//! Read from `FLEET_*` environment variables, optionally layered over a file
//! named by `FLEET_CONFIG`. Id and name lists are comma separated.

use anyhow::{Context, Result};
use fleet_lib::decision::DecisionConfig;
use fleet_lib::poll::{PollConfig, PollMode};
use fleet_lib::selector::{RangeWindow, SelectionCriteria};
use fleet_lib::store::GapFillConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_region")]
    pub region: String,

    /// Directory holding one series file per instance
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_aws_binary")]
    pub aws_binary: String,

    /// Delay between cycles in seconds
    #[serde(default = "default_watch_delay")]
    pub watch_delay_secs: u64,

    /// Decision window in hours
    #[serde(default = "default_window_hours")]
    pub window_hours: u64,

    /// Submit reclaimed instances for termination
    #[serde(default)]
    pub reclaim: bool,

    #[serde(default)]
    pub include_ids: Vec<String>,

    #[serde(default)]
    pub include_names: Vec<String>,

    #[serde(default)]
    pub invert: bool,

    /// Index range over the selection, e.g. `0:10` or `-3:`
    #[serde(default)]
    pub select: Option<String>,

    #[serde(default = "default_reclaim_threshold")]
    pub reclaim_threshold: f64,

    #[serde(default = "default_sample_period")]
    pub sample_period_secs: u64,

    #[serde(default = "default_staleness")]
    pub staleness_mins: u64,

    #[serde(default = "default_bootstrap")]
    pub bootstrap_hours: u64,
}

fn default_region() -> String {
    "us-west-1".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_api_port() -> u16 {
    8080
}

fn default_aws_binary() -> String {
    fleet_lib::provider::DEFAULT_AWS_BINARY.to_string()
}

fn default_watch_delay() -> u64 {
    45
}

fn default_window_hours() -> u64 {
    1
}

fn default_reclaim_threshold() -> f64 {
    fleet_lib::decision::DEFAULT_RECLAIM_THRESHOLD
}

fn default_sample_period() -> u64 {
    300
}

fn default_staleness() -> u64 {
    10
}

fn default_bootstrap() -> u64 {
    24
}

impl AgentConfig {
    /// Load configuration from environment and config file
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Ok(path) = std::env::var("FLEET_CONFIG") {
            builder = builder.add_source(config::File::with_name(&path).required(false));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("FLEET")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("include_ids")
                    .with_list_parse_key("include_names"),
            )
            .build()
            .context("Failed to read agent configuration")?;

        config
            .try_deserialize()
            .context("Invalid agent configuration")
    }

    pub fn criteria(&self) -> Result<SelectionCriteria> {
        let mut criteria = SelectionCriteria::new()
            .with_ids(self.include_ids.iter().cloned())
            .with_names(self.include_names.iter().cloned())
            .inverted(self.invert);

        if let Some(select) = &self.select {
            let range: RangeWindow = select
                .parse()
                .with_context(|| format!("Invalid select range '{}'", select))?;
            criteria = criteria.with_range(range);
        }

        Ok(criteria)
    }

    /// Poll settings for a watch-mode loop
    pub fn poll_config(&self) -> Result<PollConfig> {
        Ok(PollConfig {
            region: self.region.clone(),
            criteria: self.criteria()?,
            mode: PollMode::Watch,
            watch_delay: Duration::from_secs(self.watch_delay_secs),
            window: Duration::from_secs(self.window_hours * 3600),
            reclaim: self.reclaim,
            decision: DecisionConfig {
                reclaim_threshold: self.reclaim_threshold,
                sample_period: Duration::from_secs(self.sample_period_secs),
            },
            gap_fill: GapFillConfig {
                staleness: Duration::from_secs(self.staleness_mins * 60),
                bootstrap_lookback: Duration::from_secs(self.bootstrap_hours * 3600),
            },
            ..PollConfig::default()
        })
    }
}
