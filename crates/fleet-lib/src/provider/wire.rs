//! JSON shapes returned by the provider CLI
//!
//! Only the fields the monitor consumes are modelled; everything else in the
//! provider's output is ignored by serde.

use crate::error::{FleetError, Result};
use crate::models::MetricPoint;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Output of `ec2 describe-instances`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeInstancesOutput {
    #[serde(default)]
    pub reservations: Vec<Reservation>,
}

/// A launch group; one reservation may hold many instances
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Reservation {
    #[serde(default)]
    pub instances: Vec<RawInstance>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawInstance {
    pub instance_id: String,
    #[serde(default)]
    pub tags: Vec<RawTag>,
    #[serde(default)]
    pub public_ip_address: Option<String>,
    #[serde(default)]
    pub private_ip_address: Option<String>,
    pub state: RawState,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawTag {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawState {
    pub name: String,
}

/// Output of `cloudwatch get-metric-statistics`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetricStatisticsOutput {
    #[serde(default)]
    pub datapoints: Vec<Datapoint>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Datapoint {
    pub timestamp: DateTime<Utc>,
    pub average: f64,
}

impl MetricStatisticsOutput {
    /// Convert datapoints into minute-resolution points sorted by timestamp
    pub fn into_points(self) -> Vec<MetricPoint> {
        let mut points: Vec<MetricPoint> = self
            .datapoints
            .into_iter()
            .map(|dp| MetricPoint::new(dp.timestamp, dp.average))
            .collect();
        points.sort_by_key(|p| p.timestamp);
        points
    }
}

pub fn parse_describe_instances(raw: &[u8]) -> Result<DescribeInstancesOutput> {
    serde_json::from_slice(raw).map_err(|e| FleetError::malformed("describe-instances output", e))
}

pub fn parse_metric_statistics(raw: &[u8]) -> Result<MetricStatisticsOutput> {
    serde_json::from_slice(raw)
        .map_err(|e| FleetError::malformed("get-metric-statistics output", e))
}
