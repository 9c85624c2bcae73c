//! Cloud provider collaborators
//!
//! The monitoring core only talks to the provider through the traits in this
//! module. [`AwsCli`] implements all of them by spawning the `aws` command line
//! tool and parsing its JSON output; tests substitute in-memory mocks.

mod aws_cli;
pub mod wire;

pub use aws_cli::{AwsCli, DEFAULT_AWS_BINARY};
pub use wire::DescribeInstancesOutput;

use crate::error::Result;
use crate::models::MetricPoint;
use chrono::{DateTime, Utc};

pub use async_trait::async_trait;

/// Source of raw instance descriptions
#[async_trait]
pub trait InventoryProvider: Send + Sync {
    /// Describe every instance visible in `region`
    async fn describe_instances(&self, region: &str) -> Result<DescribeInstancesOutput>;
}

/// Source of utilization statistics
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Fetch average utilization points for `instance_id` between `start` and `end`.
    ///
    /// Returns an empty vector when the provider has no datapoints yet.
    async fn fetch_range(
        &self,
        instance_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MetricPoint>>;
}

/// Submits instance terminations
#[async_trait]
pub trait Terminator: Send + Sync {
    /// Submit termination for `instance_ids`; the shutdown itself is not tracked
    async fn terminate(&self, region: &str, instance_ids: &[String]) -> Result<()>;
}
