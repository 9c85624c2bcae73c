//! Incremental gap filling
//!
//! Decides which time range, if any, must be fetched to bring a persisted
//! series up to date, fetches it, and merges the result back into the store.

use super::{MetricSeries, SeriesStore};
use crate::error::FleetError;
use crate::models::{truncate_to_minute, Operation};
use crate::provider::MetricsSource;
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Default age of the newest point before a series counts as stale (10 minutes)
pub const DEFAULT_STALENESS: Duration = Duration::from_secs(10 * 60);

/// Default history fetched for an instance seen for the first time (24 hours)
pub const DEFAULT_BOOTSTRAP_LOOKBACK: Duration = Duration::from_secs(24 * 60 * 60);

/// Gap fill policy
#[derive(Debug, Clone)]
pub struct GapFillConfig {
    /// Refetch once the newest stored point is older than this
    pub staleness: Duration,
    /// History requested when nothing is stored yet
    pub bootstrap_lookback: Duration,
}

impl Default for GapFillConfig {
    fn default() -> Self {
        Self {
            staleness: DEFAULT_STALENESS,
            bootstrap_lookback: DEFAULT_BOOTSTRAP_LOOKBACK,
        }
    }
}

/// What must be fetched for one series
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPlan {
    /// Nothing stored yet, fetch the full lookback window
    Bootstrap {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Stored series is stale, fetch from its newest point onwards
    Delta {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    UpToDate,
}

impl FetchPlan {
    pub fn range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match *self {
            FetchPlan::Bootstrap { start, end } | FetchPlan::Delta { start, end } => {
                Some((start, end))
            }
            FetchPlan::UpToDate => None,
        }
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// Plan the fetch needed to bring `series` up to `now`.
///
/// Staleness is judged against the exact `now`; only the requested bounds are
/// truncated to the minute.
pub fn plan_fetch(series: &MetricSeries, now: DateTime<Utc>, config: &GapFillConfig) -> FetchPlan {
    let end = truncate_to_minute(now);

    match series.last_timestamp() {
        None => FetchPlan::Bootstrap {
            start: end
                .checked_sub_signed(to_delta(config.bootstrap_lookback))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            end,
        },
        Some(last) if now - last > to_delta(config.staleness) => {
            FetchPlan::Delta { start: last, end }
        }
        Some(_) => FetchPlan::UpToDate,
    }
}

/// A refresh failure, tagged with the step that failed
#[derive(Debug, Error)]
#[error("{operation} failed: {source}")]
pub struct RefreshError {
    pub operation: Operation,
    #[source]
    pub source: FleetError,
}

impl RefreshError {
    fn at(operation: Operation) -> impl FnOnce(FleetError) -> Self {
        move |source| Self { operation, source }
    }
}

/// Result of refreshing one series
#[derive(Debug, Clone)]
pub struct Refreshed {
    pub series: MetricSeries,
    pub plan: FetchPlan,
    /// Points returned by the metric source
    pub fetched: usize,
    /// Timestamps that were not stored before
    pub added: usize,
}

/// Load the series for `instance_id`, fill any gap from `source` and persist it.
///
/// On a failed fetch or save the stored series is left untouched.
pub async fn refresh_series(
    store: &dyn SeriesStore,
    source: &dyn MetricsSource,
    instance_id: &str,
    now: DateTime<Utc>,
    config: &GapFillConfig,
) -> Result<Refreshed, RefreshError> {
    let mut series = store
        .load(instance_id)
        .map_err(RefreshError::at(Operation::LoadSeries))?;

    let plan = plan_fetch(&series, now, config);
    let Some((start, end)) = plan.range() else {
        return Ok(Refreshed {
            series,
            plan,
            fetched: 0,
            added: 0,
        });
    };

    let points = source
        .fetch_range(instance_id, start, end)
        .await
        .map_err(RefreshError::at(Operation::FetchMetrics))?;
    let fetched = points.len();

    let added = series.merge(points);
    if fetched > 0 {
        store
            .save(&series)
            .map_err(RefreshError::at(Operation::PersistSeries))?;
    }

    debug!(
        instance_id = %instance_id,
        plan = ?plan,
        fetched,
        added,
        total = series.len(),
        "Series refreshed"
    );

    Ok(Refreshed {
        series,
        plan,
        fetched,
        added,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::models::MetricPoint;
    use crate::provider::async_trait;
    use crate::store::FileSeriesStore;
    use chrono::TimeZone;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    /// Records requested ranges and answers with a fixed batch
    struct RecordingSource {
        points: Vec<MetricPoint>,
        fail: bool,
        calls: Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>,
    }

    impl RecordingSource {
        fn new(points: Vec<MetricPoint>) -> Self {
            Self {
                points,
                fail: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                points: Vec::new(),
                fail: true,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MetricsSource for RecordingSource {
        async fn fetch_range(
            &self,
            _instance_id: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> Result<Vec<MetricPoint>> {
            self.calls.lock().unwrap().push((start, end));
            if self.fail {
                return Err(FleetError::collaborator("cloudwatch", "connection reset"));
            }
            Ok(self.points.clone())
        }
    }

    #[test]
    fn test_plan_bootstrap_for_empty_series() {
        let plan = plan_fetch(&MetricSeries::empty("i-1"), now(), &GapFillConfig::default());
        assert_eq!(
            plan,
            FetchPlan::Bootstrap {
                start: now() - TimeDelta::hours(24),
                end: now()
            }
        );
    }

    #[test]
    fn test_plan_delta_when_stale() {
        let last = now() - TimeDelta::minutes(11);
        let series = MetricSeries::from_points("i-1", vec![MetricPoint::new(last, 10.0)]);
        assert_eq!(
            plan_fetch(&series, now(), &GapFillConfig::default()),
            FetchPlan::Delta {
                start: last,
                end: now()
            }
        );
    }

    #[test]
    fn test_plan_up_to_date_within_staleness() {
        let series = MetricSeries::from_points(
            "i-1",
            vec![MetricPoint::new(now() - TimeDelta::minutes(10), 10.0)],
        );
        assert_eq!(
            plan_fetch(&series, now(), &GapFillConfig::default()),
            FetchPlan::UpToDate
        );
    }

    #[test]
    fn test_plan_staleness_uses_exact_now() {
        let last = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 10, 45).unwrap();
        let series = MetricSeries::from_points("i-1", vec![MetricPoint::new(last, 10.0)]);

        assert_eq!(
            plan_fetch(&series, now, &GapFillConfig::default()),
            FetchPlan::Delta {
                start: last,
                end: Utc.with_ymd_and_hms(2024, 5, 1, 12, 10, 0).unwrap()
            }
        );
    }

    #[tokio::test]
    async fn test_refresh_bootstrap_persists_fetched_points() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSeriesStore::open(temp_dir.path()).unwrap();
        let source = RecordingSource::new(vec![
            MetricPoint::new(now() - TimeDelta::minutes(10), 40.0),
            MetricPoint::new(now() - TimeDelta::minutes(5), 50.0),
        ]);

        let refreshed = refresh_series(&store, &source, "i-1", now(), &GapFillConfig::default())
            .await
            .unwrap();

        assert!(matches!(refreshed.plan, FetchPlan::Bootstrap { .. }));
        assert_eq!(refreshed.added, 2);
        assert_eq!(store.load("i-1").unwrap().len(), 2);
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_bootstrap_with_no_data_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSeriesStore::open(temp_dir.path()).unwrap();
        let source = RecordingSource::new(Vec::new());

        let refreshed = refresh_series(&store, &source, "i-new", now(), &GapFillConfig::default())
            .await
            .unwrap();

        assert!(refreshed.series.is_empty());
        assert!(!store.path_for("i-new").exists());
    }

    #[tokio::test]
    async fn test_refresh_fetches_only_the_delta() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSeriesStore::open(temp_dir.path()).unwrap();
        let last = now() - TimeDelta::minutes(30);
        store
            .save(&MetricSeries::from_points(
                "i-1",
                vec![MetricPoint::new(last, 20.0)],
            ))
            .unwrap();

        let source = RecordingSource::new(vec![
            MetricPoint::new(last, 25.0),
            MetricPoint::new(last + TimeDelta::minutes(5), 30.0),
        ]);
        let refreshed = refresh_series(&store, &source, "i-1", now(), &GapFillConfig::default())
            .await
            .unwrap();

        assert_eq!(source.calls(), vec![(last, now())]);
        assert_eq!(refreshed.added, 1);
        let stored = store.load("i-1").unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored.points()[0].value, 25.0);
    }

    #[tokio::test]
    async fn test_refresh_skips_fetch_when_fresh() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSeriesStore::open(temp_dir.path()).unwrap();
        store
            .save(&MetricSeries::from_points(
                "i-1",
                vec![MetricPoint::new(now() - TimeDelta::minutes(3), 20.0)],
            ))
            .unwrap();
        let source = RecordingSource::new(Vec::new());

        let refreshed = refresh_series(&store, &source, "i-1", now(), &GapFillConfig::default())
            .await
            .unwrap();

        assert_eq!(refreshed.plan, FetchPlan::UpToDate);
        assert_eq!(refreshed.series.len(), 1);
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_fetch_failure_keeps_stored_series() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileSeriesStore::open(temp_dir.path()).unwrap();
        let original = MetricSeries::from_points(
            "i-1",
            vec![MetricPoint::new(now() - TimeDelta::hours(2), 20.0)],
        );
        store.save(&original).unwrap();

        let err = refresh_series(
            &store,
            &RecordingSource::failing(),
            "i-1",
            now(),
            &GapFillConfig::default(),
        )
        .await
        .unwrap_err();

        assert_eq!(err.operation, Operation::FetchMetrics);
        assert_eq!(store.load("i-1").unwrap(), original);
    }
}
