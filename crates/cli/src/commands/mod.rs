//! CLI subcommands

pub mod connect;
pub mod cpu;
pub mod info;
pub mod terminate;

use crate::output::OutputFormat;
use anyhow::{Context, Result};
use fleet_lib::inventory::{fetch_snapshot, Snapshot};
use fleet_lib::provider::AwsCli;
use fleet_lib::selector::{select, SelectionCriteria};
use fleet_lib::InstanceRecord;

/// Settings shared by every subcommand
pub struct Session {
    pub region: String,
    pub criteria: SelectionCriteria,
    pub format: OutputFormat,
    pub aws_binary: String,
}

impl Session {
    pub fn provider(&self) -> AwsCli {
        AwsCli::with_binary(&self.aws_binary, &self.region)
    }

    pub async fn snapshot(&self) -> Result<Snapshot> {
        fetch_snapshot(&self.provider(), &self.region)
            .await
            .with_context(|| format!("Failed to list instances in {}", self.region))
    }
}

/// Instances matching the session's criteria, in snapshot order
pub fn selected<'a>(snapshot: &'a Snapshot, session: &Session) -> Vec<&'a InstanceRecord> {
    select(snapshot, &session.criteria)
}
