//! Retain/reclaim decisions
//!
//! Averages the most recent samples of a series and compares the mean against
//! a fixed utilization threshold. An instance with no samples in the window
//! gets no verdict at all rather than a guessed one.

use crate::models::{Decision, Verdict};
use crate::store::MetricSeries;
use serde::Serialize;
use std::time::Duration;

/// Default mean utilization (percent) below which an instance is reclaimed
pub const DEFAULT_RECLAIM_THRESHOLD: f64 = 55.0;

/// Default sampling period of the metric source (5 minutes)
pub const DEFAULT_SAMPLE_PERIOD: Duration = Duration::from_secs(300);

/// Decision policy
#[derive(Debug, Clone)]
pub struct DecisionConfig {
    pub reclaim_threshold: f64,
    /// Used to turn a time window into a sample count
    pub sample_period: Duration,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            reclaim_threshold: DEFAULT_RECLAIM_THRESHOLD,
            sample_period: DEFAULT_SAMPLE_PERIOD,
        }
    }
}

/// Classifies instances from their utilization series
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    config: DecisionConfig,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Number of trailing samples covered by `window` (at least one)
    pub fn sample_count(&self, window: Duration) -> usize {
        let period = self.config.sample_period.as_secs().max(1);
        ((window.as_secs() / period) as usize).max(1)
    }

    /// Decide over the most recent samples covering `window`.
    ///
    /// The window counts stored samples, not wall-clock time: with gaps in the
    /// series the samples may reach further back than `window`.
    pub fn decide(&self, series: &MetricSeries, window: Duration) -> Option<Decision> {
        let slice = series.tail(self.sample_count(window));
        if slice.is_empty() {
            return None;
        }

        let mean_value = slice.iter().map(|p| p.value).sum::<f64>() / slice.len() as f64;
        let verdict = if mean_value < self.config.reclaim_threshold {
            Verdict::Reclaim
        } else {
            Verdict::Retain
        };

        Some(Decision {
            id: series.instance_id.clone(),
            mean_value,
            samples: slice.len(),
            verdict,
        })
    }

    /// Decide for every series, in order; series without samples are abstentions
    pub fn decide_all<'a>(
        &self,
        series: impl IntoIterator<Item = &'a MetricSeries>,
        window: Duration,
    ) -> DecisionSet {
        let mut set = DecisionSet::default();
        for s in series {
            match self.decide(s, window) {
                Some(decision) => set.decisions.push(decision),
                None => set.abstained.push(s.instance_id.clone()),
            }
        }
        set
    }
}

/// Verdicts of one cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DecisionSet {
    /// Decisions in selection order
    pub decisions: Vec<Decision>,
    /// Instances without samples in the window
    pub abstained: Vec<String>,
}

impl DecisionSet {
    pub fn retained(&self) -> impl Iterator<Item = &Decision> {
        self.with_verdict(Verdict::Retain)
    }

    pub fn reclaimed(&self) -> impl Iterator<Item = &Decision> {
        self.with_verdict(Verdict::Reclaim)
    }

    fn with_verdict(&self, verdict: Verdict) -> impl Iterator<Item = &Decision> {
        self.decisions.iter().filter(move |d| d.verdict == verdict)
    }

    pub fn reclaim_ids(&self) -> Vec<String> {
        self.reclaimed().map(|d| d.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }
}
