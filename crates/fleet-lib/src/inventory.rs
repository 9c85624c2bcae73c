//! Inventory snapshots
//!
//! Fetches instance descriptions from the provider and normalizes them into
//! [`InstanceRecord`]s, flattening the reservation/instance nesting and dropping
//! terminated instances.

use crate::error::Result;
use crate::models::{InstanceRecord, LifecycleState};
use crate::provider::wire::{DescribeInstancesOutput, RawInstance};
use crate::provider::InventoryProvider;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Point-in-time view of all non-terminated instances, in provider order
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    records: Vec<InstanceRecord>,
    index: HashMap<String, usize>,
}

impl Snapshot {
    /// Build a snapshot; a repeated id replaces the earlier record in place
    pub fn from_records(records: impl IntoIterator<Item = InstanceRecord>) -> Self {
        let mut snapshot = Self::default();
        for record in records {
            snapshot.insert(record);
        }
        snapshot
    }

    fn insert(&mut self, record: InstanceRecord) {
        match self.index.get(&record.id) {
            Some(&pos) => {
                warn!(instance_id = %record.id, "Instance id repeated in inventory, keeping latest");
                self.records[pos] = record;
            }
            None => {
                self.index.insert(record.id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&InstanceRecord> {
        self.index.get(id).map(|&pos| &self.records[pos])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InstanceRecord> {
        self.records.iter()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Fetch and normalize the current inventory for `region`
pub async fn fetch_snapshot(provider: &dyn InventoryProvider, region: &str) -> Result<Snapshot> {
    let output = provider.describe_instances(region).await?;
    let snapshot = normalize(output);
    debug!(region = %region, instances = snapshot.len(), "Fetched inventory snapshot");
    Ok(snapshot)
}

/// Flatten a describe-instances response into a snapshot
pub fn normalize(output: DescribeInstancesOutput) -> Snapshot {
    let records = output
        .reservations
        .into_iter()
        .flat_map(|reservation| reservation.instances)
        .map(to_record)
        .filter(|record| record.lifecycle_state != LifecycleState::Terminated);

    Snapshot::from_records(records)
}

fn to_record(raw: RawInstance) -> InstanceRecord {
    InstanceRecord {
        id: raw.instance_id,
        tags: raw.tags.into_iter().map(|t| (t.key, t.value)).collect(),
        public_address: raw.public_ip_address,
        private_address: raw.private_ip_address,
        lifecycle_state: LifecycleState::from(raw.state.name),
    }
}
