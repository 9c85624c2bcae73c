//! Fleet CLI
//!
//! Inspect, connect to, and reclaim provider instances, and run the
//! utilization poll loop from the command line.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{connect, cpu, info, terminate, Session};
use fleet_lib::selector::{RangeWindow, SelectionCriteria};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Fleet utilization monitor CLI
#[derive(Parser)]
#[command(name = "fleet")]
#[command(author, version, about = "Fleet utilization monitor and reclaimer", long_about = None)]
pub struct Cli {
    /// Provider region (defaults to the config file, then us-west-1)
    #[arg(long, env = "FLEET_REGION", global = true)]
    pub region: Option<String>,

    /// Select instances by id (repeatable or comma separated)
    #[arg(long = "iid", value_delimiter = ',', global = true)]
    pub iids: Vec<String>,

    /// Select instances by Name tag (repeatable or comma separated)
    #[arg(long = "nametag", value_delimiter = ',', global = true)]
    pub nametags: Vec<String>,

    /// Invert the id/name selection
    #[arg(short = 'i', long = "inverse", global = true)]
    pub inverse: bool,

    /// Index range over the selection, e.g. 0:5, -2:, :3
    #[arg(long, allow_hyphen_values = true, global = true)]
    pub select: Option<RangeWindow>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// SSH key name, resolved to ~/.ssh/<key>.pem
    #[arg(long, global = true)]
    pub key: Option<String>,

    /// Directory holding the utilization series
    #[arg(long, env = "FLEET_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Provider CLI binary
    #[arg(long, env = "FLEET_AWS_BINARY", default_value = fleet_lib::provider::DEFAULT_AWS_BINARY, global = true)]
    pub aws_binary: String,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the selected instances
    Info {
        /// Show public IP addresses
        #[arg(long)]
        pub_ip: bool,

        /// Show private IP addresses
        #[arg(long)]
        priv_ip: bool,

        /// Show all tags
        #[arg(long)]
        tags: bool,

        /// Show lifecycle state
        #[arg(long)]
        state: bool,
    },

    /// SSH into each selected instance in turn
    Connect,

    /// Submit termination for every selected instance
    Terminate,

    /// Refresh utilization and decide which instances to retain or reclaim
    Cpu {
        /// Keep polling until interrupted
        #[arg(long)]
        watch: bool,

        /// Terminate instances with a reclaim verdict
        #[arg(long)]
        drop: bool,

        /// Decision window in hours
        #[arg(long, default_value_t = 1)]
        window_hours: u64,

        /// Delay between cycles in watch mode
        #[arg(long, default_value_t = 45)]
        watch_delay_secs: u64,

        /// Mean utilization (percent) below which an instance is reclaimed
        #[arg(long, default_value_t = fleet_lib::decision::DEFAULT_RECLAIM_THRESHOLD)]
        threshold: f64,
    },
}

impl Cli {
    fn criteria(&self) -> SelectionCriteria {
        let mut criteria = SelectionCriteria::new()
            .with_ids(self.iids.iter().cloned())
            .with_names(self.nametags.iter().cloned())
            .inverted(self.inverse);
        if let Some(range) = self.select {
            criteria = criteria.with_range(range);
        }
        criteria
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let file_config = config::Config::load()?;
    let session = Session {
        region: file_config.region_or_default(cli.region.clone()),
        criteria: cli.criteria(),
        format: cli.format,
        aws_binary: cli.aws_binary.clone(),
    };

    match cli.command {
        Commands::Info {
            pub_ip,
            priv_ip,
            tags,
            state,
        } => {
            let columns = info::Columns {
                public_ip: pub_ip,
                private_ip: priv_ip,
                tags,
                state,
            };
            info::show_instances(&session, columns).await?;
        }
        Commands::Connect => {
            let key_path = file_config.key_path(cli.key)?;
            connect::connect_all(&session, &key_path).await?;
        }
        Commands::Terminate => {
            terminate::terminate_selected(&session).await?;
        }
        Commands::Cpu {
            watch,
            drop,
            window_hours,
            watch_delay_secs,
            threshold,
        } => {
            let options = cpu::CpuOptions {
                watch,
                drop,
                window_hours,
                watch_delay_secs,
                threshold,
                data_dir: file_config.data_dir_or_default(cli.data_dir),
            };
            cpu::run(&session, options).await?;
        }
    }

    Ok(())
}
