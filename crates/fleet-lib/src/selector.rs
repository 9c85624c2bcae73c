//! Instance selection
//!
//! Narrows a snapshot down to the instances an operation should act on, by
//! explicit id, by `Name` tag, optionally inverted, and finally sliced by an
//! index range over the ordered result.

use crate::error::FleetError;
use crate::inventory::Snapshot;
use crate::models::InstanceRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::ops::Range;
use std::str::FromStr;

/// Criteria for narrowing a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionCriteria {
    pub include_ids: BTreeSet<String>,
    /// Matched against the `Name` tag
    pub include_names: BTreeSet<String>,
    pub invert: bool,
    pub range: Option<RangeWindow>,
}

impl SelectionCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_ids.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn inverted(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    pub fn with_range(mut self, range: RangeWindow) -> Self {
        self.range = Some(range);
        self
    }
}

/// Slice `[lower, upper)` over the ordered selection result.
///
/// Negative bounds count from the end and missing bounds are open. Bounds
/// are clamped to the sequence, so any window is valid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeWindow {
    pub lower: Option<i64>,
    pub upper: Option<i64>,
}

impl RangeWindow {
    pub fn new(lower: i64, upper: i64) -> Self {
        Self {
            lower: Some(lower),
            upper: Some(upper),
        }
    }

    /// Resolve against a sequence of `len` items
    pub fn resolve(&self, len: usize) -> Range<usize> {
        let clamp = |bound: i64| -> usize {
            if bound < 0 {
                len.saturating_sub(bound.unsigned_abs() as usize)
            } else {
                (bound as usize).min(len)
            }
        };

        let start = self.lower.map(clamp).unwrap_or(0);
        let end = self.upper.map(clamp).unwrap_or(len);
        if start >= end {
            start..start
        } else {
            start..end
        }
    }
}

impl FromStr for RangeWindow {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lower, upper) = s
            .split_once(':')
            .ok_or_else(|| FleetError::InvalidRange(s.to_string()))?;

        let parse = |part: &str| -> Result<Option<i64>, FleetError> {
            let part = part.trim();
            if part.is_empty() {
                return Ok(None);
            }
            part.parse()
                .map(Some)
                .map_err(|_| FleetError::InvalidRange(s.to_string()))
        };

        Ok(Self {
            lower: parse(lower)?,
            upper: parse(upper)?,
        })
    }
}

/// Apply `criteria` to `snapshot`, preserving snapshot order
pub fn select<'a>(snapshot: &'a Snapshot, criteria: &SelectionCriteria) -> Vec<&'a InstanceRecord> {
    let mut targets: BTreeSet<&str> = criteria.include_ids.iter().map(String::as_str).collect();

    if !criteria.include_names.is_empty() {
        targets.extend(
            snapshot
                .iter()
                .filter(|r| {
                    r.name()
                        .map(|name| criteria.include_names.contains(name))
                        .unwrap_or(false)
                })
                .map(|r| r.id.as_str()),
        );
    }

    let selected: Vec<&InstanceRecord> = if targets.is_empty() {
        snapshot.iter().collect()
    } else {
        snapshot
            .iter()
            .filter(|r| targets.contains(r.id.as_str()) != criteria.invert)
            .collect()
    };

    match criteria.range {
        Some(window) => {
            let range = window.resolve(selected.len());
            selected[range].to_vec()
        }
        None => selected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LifecycleState;
    use std::collections::BTreeMap;

    fn record(id: &str, name: Option<&str>) -> InstanceRecord {
        let mut tags = BTreeMap::new();
        if let Some(name) = name {
            tags.insert("Name".to_string(), name.to_string());
        }
        InstanceRecord {
            id: id.to_string(),
            tags,
            public_address: None,
            private_address: None,
            lifecycle_state: LifecycleState::Running,
        }
    }

    fn ids(selected: &[&InstanceRecord]) -> Vec<String> {
        selected.iter().map(|r| r.id.clone()).collect()
    }

    fn abc() -> Snapshot {
        Snapshot::from_records(vec![
            record("A", Some("scheduler")),
            record("B", Some("worker")),
            record("C", None),
        ])
    }

    #[test]
    fn test_empty_criteria_selects_everything() {
        let snapshot = abc();
        let selected = select(&snapshot, &SelectionCriteria::new());
        assert_eq!(ids(&selected), vec!["A", "B", "C"]);

        // Invert alone does not change the default
        let selected = select(&snapshot, &SelectionCriteria::new().inverted(true));
        assert_eq!(ids(&selected), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_select_by_name() {
        let snapshot = abc();
        let criteria = SelectionCriteria::new().with_names(["worker"]);

        assert_eq!(ids(&select(&snapshot, &criteria)), vec!["B"]);
        assert_eq!(
            ids(&select(&snapshot, &criteria.clone().inverted(true))),
            vec!["A", "C"]
        );
    }

    #[test]
    fn test_unknown_name_contributes_nothing() {
        let snapshot = abc();
        let criteria = SelectionCriteria::new()
            .with_names(["nobody"])
            .with_ids(["C"]);
        assert_eq!(ids(&select(&snapshot, &criteria)), vec!["C"]);
    }

    #[test]
    fn test_duplicate_names_all_selected() {
        let snapshot = Snapshot::from_records(vec![
            record("w1", Some("worker")),
            record("s", Some("scheduler")),
            record("w2", Some("worker")),
        ]);
        let criteria = SelectionCriteria::new().with_names(["worker"]);
        assert_eq!(ids(&select(&snapshot, &criteria)), vec!["w1", "w2"]);
    }

    #[test]
    fn test_invert_partitions_snapshot() {
        let snapshot = Snapshot::from_records((0..8).map(|i| {
            record(&format!("i-{}", i), Some(if i % 3 == 0 { "a" } else { "b" }))
        }));
        let criteria = SelectionCriteria::new().with_names(["a"]).with_ids(["i-4"]);

        let included = ids(&select(&snapshot, &criteria));
        let excluded = ids(&select(&snapshot, &criteria.clone().inverted(true)));

        assert!(included.iter().all(|id| !excluded.contains(id)));
        let mut union: Vec<String> = included.into_iter().chain(excluded).collect();
        union.sort();
        let mut all: Vec<String> = snapshot.ids().map(String::from).collect();
        all.sort();
        assert_eq!(union, all);
    }

    #[test]
    fn test_range_window_slices_and_clamps() {
        let snapshot = Snapshot::from_records((0..5).map(|i| record(&format!("i-{}", i), None)));

        let criteria = SelectionCriteria::new().with_range(RangeWindow::new(1, 3));
        assert_eq!(ids(&select(&snapshot, &criteria)), vec!["i-1", "i-2"]);

        let criteria = SelectionCriteria::new().with_range(RangeWindow::new(3, 100));
        assert_eq!(ids(&select(&snapshot, &criteria)), vec!["i-3", "i-4"]);

        let criteria = SelectionCriteria::new().with_range(RangeWindow::new(10, 20));
        assert!(select(&snapshot, &criteria).is_empty());

        let criteria = SelectionCriteria::new().with_range(RangeWindow::new(4, 2));
        assert!(select(&snapshot, &criteria).is_empty());
    }

    #[test]
    fn test_range_applies_after_filtering() {
        let snapshot = Snapshot::from_records(vec![
            record("w1", Some("worker")),
            record("s", Some("scheduler")),
            record("w2", Some("worker")),
            record("w3", Some("worker")),
        ]);
        let criteria = SelectionCriteria::new()
            .with_names(["worker"])
            .with_range(RangeWindow::new(1, 2));
        assert_eq!(ids(&select(&snapshot, &criteria)), vec!["w2"]);
    }

    #[test]
    fn test_range_window_parse() {
        assert_eq!("0:2".parse::<RangeWindow>().unwrap(), RangeWindow::new(0, 2));
        assert_eq!(
            "2:".parse::<RangeWindow>().unwrap(),
            RangeWindow {
                lower: Some(2),
                upper: None
            }
        );
        assert_eq!(
            ":-1".parse::<RangeWindow>().unwrap(),
            RangeWindow {
                lower: None,
                upper: Some(-1)
            }
        );
        assert!(matches!(
            "3".parse::<RangeWindow>(),
            Err(FleetError::InvalidRange(_))
        ));
        assert!(matches!(
            "a:b".parse::<RangeWindow>(),
            Err(FleetError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_negative_bounds_count_from_end() {
        let window = RangeWindow::new(-2, 5);
        assert_eq!(window.resolve(5), 3..5);

        let window = RangeWindow {
            lower: None,
            upper: Some(-1),
        };
        assert_eq!(window.resolve(5), 0..4);

        assert_eq!(RangeWindow::new(-10, 2).resolve(5), 0..2);
    }
}
