//! Core data models for the fleet monitor

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tag key the provider console displays as the instance name
pub const NAME_TAG: &str = "Name";

/// Lifecycle state reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LifecycleState {
    Pending,
    Running,
    ShuttingDown,
    Stopping,
    Stopped,
    Terminated,
    /// Any state name this crate does not know about
    Other(String),
}

impl LifecycleState {
    pub fn as_str(&self) -> &str {
        match self {
            LifecycleState::Pending => "pending",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting-down",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Terminated => "terminated",
            LifecycleState::Other(name) => name,
        }
    }
}

impl From<String> for LifecycleState {
    fn from(name: String) -> Self {
        match name.as_str() {
            "pending" => LifecycleState::Pending,
            "running" => LifecycleState::Running,
            "shutting-down" => LifecycleState::ShuttingDown,
            "stopping" => LifecycleState::Stopping,
            "stopped" => LifecycleState::Stopped,
            "terminated" => LifecycleState::Terminated,
            _ => LifecycleState::Other(name),
        }
    }
}

impl From<LifecycleState> for String {
    fn from(state: LifecycleState) -> Self {
        state.as_str().to_string()
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized instance record from one inventory snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: String,
    pub tags: BTreeMap<String, String>,
    pub public_address: Option<String>,
    pub private_address: Option<String>,
    pub lifecycle_state: LifecycleState,
}

impl InstanceRecord {
    /// Value of the `Name` tag, if the instance carries one
    pub fn name(&self) -> Option<&str> {
        self.tags.get(NAME_TAG).map(String::as_str)
    }
}

/// A single utilization sample
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    /// Sample instant, truncated to the minute
    pub timestamp: DateTime<Utc>,
    /// Utilization percentage (0-100)
    pub value: f64,
}

impl MetricPoint {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self {
            timestamp: truncate_to_minute(timestamp),
            value,
        }
    }
}

/// Drop seconds and sub-second precision from an instant
pub fn truncate_to_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(TimeDelta::minutes(1)).unwrap_or(ts)
}

/// Retain/reclaim classification for one instance in one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Retain,
    Reclaim,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Retain => f.write_str("retain"),
            Verdict::Reclaim => f.write_str("reclaim"),
        }
    }
}

/// Outcome of the decision engine for one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: String,
    pub mean_value: f64,
    /// Number of samples the mean was computed over
    pub samples: usize,
    pub verdict: Verdict,
}

/// Step of a poll cycle, used to attribute failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Snapshot,
    LoadSeries,
    FetchMetrics,
    PersistSeries,
    Terminate,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Snapshot => "snapshot",
            Operation::LoadSeries => "load_series",
            Operation::FetchMetrics => "fetch_metrics",
            Operation::PersistSeries => "persist_series",
            Operation::Terminate => "terminate",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_lifecycle_state_round_trips_known_and_unknown_names() {
        assert_eq!(
            LifecycleState::from("shutting-down".to_string()),
            LifecycleState::ShuttingDown
        );
        let other = LifecycleState::from("hibernating".to_string());
        assert_eq!(other, LifecycleState::Other("hibernating".to_string()));
        assert_eq!(other.to_string(), "hibernating");

        let json = serde_json::to_string(&LifecycleState::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }

    #[test]
    fn test_metric_point_truncates_to_minute() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 34, 56).unwrap();
        let point = MetricPoint::new(ts, 12.5);
        assert_eq!(
            point.timestamp,
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 34, 0).unwrap()
        );
    }

    #[test]
    fn test_instance_name_lookup() {
        let mut tags = BTreeMap::new();
        tags.insert("Name".to_string(), "worker".to_string());
        let record = InstanceRecord {
            id: "i-1".to_string(),
            tags,
            public_address: None,
            private_address: None,
            lifecycle_state: LifecycleState::Running,
        };
        assert_eq!(record.name(), Some("worker"));
    }
}
