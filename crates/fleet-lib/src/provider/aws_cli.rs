//! Provider adapter backed by the `aws` command line tool

use super::wire::{parse_describe_instances, parse_metric_statistics, DescribeInstancesOutput};
use super::{InventoryProvider, MetricsSource, Terminator};
use crate::error::{FleetError, Result};
use crate::models::MetricPoint;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Binary looked up on `PATH` when none is configured
pub const DEFAULT_AWS_BINARY: &str = "aws";

/// Statistic period requested from the metric API
const METRIC_PERIOD: Duration = Duration::from_secs(300);

/// Adapter that shells out to the `aws` CLI.
///
/// Credentials come from whatever profile or environment the CLI itself uses.
#[derive(Debug, Clone)]
pub struct AwsCli {
    binary: String,
    region: String,
}

impl AwsCli {
    pub fn new(region: impl Into<String>) -> Self {
        Self::with_binary(DEFAULT_AWS_BINARY, region)
    }

    pub fn with_binary(binary: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            region: region.into(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Run the CLI and return its stdout, failing on spawn errors or non-zero exit
    async fn run(&self, operation: &'static str, args: &[String]) -> Result<Vec<u8>> {
        debug!(binary = %self.binary, operation, "Invoking provider CLI");

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| FleetError::collaborator(operation, format!("failed to spawn: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FleetError::collaborator(
                operation,
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }

        Ok(output.stdout)
    }
}

/// Format an instant the way the metric API expects (minute precision, UTC)
pub(crate) fn minute_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%MZ").to_string()
}

pub(crate) fn describe_args(region: &str) -> Vec<String> {
    ["ec2", "describe-instances", "--region", region]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub(crate) fn metric_args(
    region: &str,
    instance_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<String> {
    vec![
        "cloudwatch".to_string(),
        "get-metric-statistics".to_string(),
        "--region".to_string(),
        region.to_string(),
        "--metric-name".to_string(),
        "CPUUtilization".to_string(),
        "--start-time".to_string(),
        minute_timestamp(start),
        "--end-time".to_string(),
        minute_timestamp(end),
        "--period".to_string(),
        METRIC_PERIOD.as_secs().to_string(),
        "--namespace".to_string(),
        "AWS/EC2".to_string(),
        "--statistics".to_string(),
        "Average".to_string(),
        "--dimensions".to_string(),
        format!("Name=InstanceId,Value={}", instance_id),
    ]
}

pub(crate) fn terminate_args(region: &str, instance_ids: &[String]) -> Vec<String> {
    let mut args = vec![
        "ec2".to_string(),
        "terminate-instances".to_string(),
        "--instance-ids".to_string(),
    ];
    args.extend(instance_ids.iter().cloned());
    args.push("--region".to_string());
    args.push(region.to_string());
    args
}

#[async_trait]
impl InventoryProvider for AwsCli {
    async fn describe_instances(&self, region: &str) -> Result<DescribeInstancesOutput> {
        let stdout = self
            .run("ec2 describe-instances", &describe_args(region))
            .await?;
        parse_describe_instances(&stdout)
    }
}

#[async_trait]
impl MetricsSource for AwsCli {
    async fn fetch_range(
        &self,
        instance_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MetricPoint>> {
        let stdout = self
            .run(
                "cloudwatch get-metric-statistics",
                &metric_args(&self.region, instance_id, start, end),
            )
            .await?;
        Ok(parse_metric_statistics(&stdout)?.into_points())
    }
}

#[async_trait]
impl Terminator for AwsCli {
    async fn terminate(&self, region: &str, instance_ids: &[String]) -> Result<()> {
        if instance_ids.is_empty() {
            return Ok(());
        }
        self.run(
            "ec2 terminate-instances",
            &terminate_args(region, instance_ids),
        )
        .await?;
        Ok(())
    }
}
