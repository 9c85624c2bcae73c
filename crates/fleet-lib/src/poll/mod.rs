//! Poll loop orchestration
//!
//! Each cycle fetches an inventory snapshot, selects the instances to act on,
//! refreshes their utilization series, and produces retain/reclaim decisions,
//! optionally submitting reclaimed instances for termination. Outcomes are
//! streamed to the caller over a channel.

mod r#loop;


pub use r#loop::{PollConfig, PollLoop, PollLoopBuilder, DEFAULT_WATCH_DELAY, DEFAULT_WINDOW};

use crate::decision::DecisionSet;
use crate::models::Operation;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Whether the loop runs a single cycle or repeats until cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollMode {
    #[default]
    Once,
    Watch,
}

/// A failure scoped to one instance; the rest of the cycle is unaffected
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceFailure {
    pub instance_id: String,
    pub operation: Operation,
    pub error: String,
}

/// Summary of a completed cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Selected instance ids, in selection order
    pub selected: Vec<String>,
    pub decisions: DecisionSet,
    pub failures: Vec<InstanceFailure>,
    /// Instances submitted for termination this cycle
    pub terminated: Vec<String>,
}

impl CycleReport {
    pub fn failures_for(&self, operation: Operation) -> usize {
        self.failures
            .iter()
            .filter(|f| f.operation == operation)
            .count()
    }
}

/// What one cycle produced
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// The cycle could not run at all (the inventory snapshot failed)
    Failed {
        cycle: u64,
        operation: Operation,
        error: String,
    },
}

impl CycleOutcome {
    pub fn cycle(&self) -> u64 {
        match self {
            CycleOutcome::Completed(report) => report.cycle,
            CycleOutcome::Failed { cycle, .. } => *cycle,
        }
    }

    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            CycleOutcome::Completed(report) => Some(report),
            CycleOutcome::Failed { .. } => None,
        }
    }
}
