//! Durable per-instance utilization series
//!
//! Each instance id owns one persisted [`MetricSeries`]. Series only ever
//! grow: new points are merged in, deduplicated by timestamp, and the result is
//! written back atomically.

mod file;
mod gap_fill;

pub use file::FileSeriesStore;
pub use gap_fill::{plan_fetch, refresh_series, FetchPlan, GapFillConfig, RefreshError, Refreshed};

use crate::error::Result;
use crate::models::MetricPoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sorted, timestamp-unique utilization history of one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub instance_id: String,
    points: Vec<MetricPoint>,
}

impl MetricSeries {
    pub fn empty(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            points: Vec::new(),
        }
    }

    /// Build a series from arbitrary points (sorted and deduplicated)
    pub fn from_points(
        instance_id: impl Into<String>,
        points: impl IntoIterator<Item = MetricPoint>,
    ) -> Self {
        let mut series = Self::empty(instance_id);
        series.merge(points);
        series
    }

    pub fn points(&self) -> &[MetricPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.points.last().map(|p| p.timestamp)
    }

    /// The `count` most recent points
    pub fn tail(&self, count: usize) -> &[MetricPoint] {
        let start = self.points.len().saturating_sub(count);
        &self.points[start..]
    }

    /// Merge `incoming` into the series.
    ///
    /// A point whose timestamp already exists replaces the stored one. Returns
    /// the number of timestamps that were not present before.
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = MetricPoint>) -> usize {
        let mut by_ts: BTreeMap<DateTime<Utc>, f64> =
            self.points.iter().map(|p| (p.timestamp, p.value)).collect();
        let before = by_ts.len();

        for point in incoming {
            by_ts.insert(point.timestamp, point.value);
        }

        let added = by_ts.len() - before;
        self.points = by_ts
            .into_iter()
            .map(|(timestamp, value)| MetricPoint { timestamp, value })
            .collect();
        added
    }
}

/// Key-value persistence for metric series, keyed by instance id
pub trait SeriesStore: Send + Sync {
    /// Load the persisted series, or an empty one if nothing is stored
    fn load(&self, instance_id: &str) -> Result<MetricSeries>;

    /// Persist `series`, replacing any previous blob atomically
    fn save(&self, series: &MetricSeries) -> Result<()>;

    /// Merge `points` into the persisted series and save the result
    fn merge(&self, instance_id: &str, points: Vec<MetricPoint>) -> Result<MetricSeries> {
        let mut series = self.load(instance_id)?;
        series.merge(points);
        self.save(&series)?;
        Ok(series)
    }
}
