//! Health tracking for the fleet monitor
//!
//! The poll loop's collaborators (inventory, metric source, series store) are
//! judged from the outcome of each cycle rather than probed separately. The
//! monitor becomes ready once a cycle has produced a report.

use crate::models::Operation;
use crate::poll::CycleOutcome;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Component names for health tracking
pub mod components {
    pub const INVENTORY: &str = "inventory";
    pub const METRIC_SOURCE: &str = "metric_source";
    pub const SERIES_STORE: &str = "series_store";
    pub const TERMINATOR: &str = "terminator";

    pub const ALL: [&str; 4] = [INVENTORY, METRIC_SOURCE, SERIES_STORE, TERMINATOR];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Some instances failed, the cycle still completed
    Degraded,
    /// The cycle could not run
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Cycle that last changed this component
    pub cycle: u64,
    pub updated_at: i64,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>, cycle: u64) -> Self {
        Self {
            status,
            message,
            cycle,
            updated_at: Utc::now().timestamp(),
        }
    }
}

/// Overall health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle: Option<u64>,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct HealthState {
    components: BTreeMap<String, ComponentHealth>,
    last_cycle: Option<u64>,
    completed_cycles: u64,
}

impl HealthState {
    fn set(&mut self, name: &str, status: ComponentStatus, message: Option<String>, cycle: u64) {
        self.components
            .insert(name.to_string(), ComponentHealth::new(status, message, cycle));
    }

    /// Worst status across components
    fn overall(&self) -> ComponentStatus {
        self.components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy)
    }
}

/// Shared, cloneable health state fed by cycle outcomes
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<HealthState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every known component as healthy
    pub async fn register_all(&self) {
        let mut state = self.state.write().await;
        for name in components::ALL {
            state.set(name, ComponentStatus::Healthy, None, 0);
        }
    }

    /// Fold one cycle outcome into component health
    pub async fn record_outcome(&self, outcome: &CycleOutcome) {
        let mut state = self.state.write().await;
        let cycle = outcome.cycle();
        state.last_cycle = Some(cycle);

        let report = match outcome {
            CycleOutcome::Failed { error, .. } => {
                state.set(
                    components::INVENTORY,
                    ComponentStatus::Unhealthy,
                    Some(error.clone()),
                    cycle,
                );
                return;
            }
            CycleOutcome::Completed(report) => report,
        };

        state.completed_cycles += 1;
        state.set(components::INVENTORY, ComponentStatus::Healthy, None, cycle);

        let per_component = [
            (components::METRIC_SOURCE, vec![Operation::FetchMetrics]),
            (
                components::SERIES_STORE,
                vec![Operation::LoadSeries, Operation::PersistSeries],
            ),
            (components::TERMINATOR, vec![Operation::Terminate]),
        ];
        for (name, operations) in per_component {
            let failed: usize = operations.iter().map(|op| report.failures_for(*op)).sum();
            if failed == 0 {
                state.set(name, ComponentStatus::Healthy, None, cycle);
            } else {
                let message = format!("{} instance(s) failed in cycle {}", failed, cycle);
                state.set(name, ComponentStatus::Degraded, Some(message), cycle);
            }
        }
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        HealthResponse {
            status: state.overall(),
            last_cycle: state.last_cycle,
            components: state.components.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;

        let reason = if state.completed_cycles == 0 {
            Some("No poll cycle completed yet")
        } else if state.overall() == ComponentStatus::Unhealthy {
            Some("Inventory unavailable in the latest cycle")
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason: reason.map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionSet;
    use crate::poll::{CycleReport, InstanceFailure};

    fn completed(cycle: u64, failures: Vec<InstanceFailure>) -> CycleOutcome {
        CycleOutcome::Completed(CycleReport {
            cycle,
            started_at: Utc::now(),
            elapsed_ms: 3,
            selected: vec!["i-1".to_string()],
            decisions: DecisionSet::default(),
            failures,
            terminated: Vec::new(),
        })
    }

    fn failure(id: &str, operation: Operation) -> InstanceFailure {
        InstanceFailure {
            instance_id: id.to_string(),
            operation,
            error: "boom".to_string(),
        }
    }

    #[tokio::test]
    async fn test_initial_state_healthy_not_ready() {
        let registry = HealthRegistry::new();
        registry.register_all().await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.components.len(), components::ALL.len());
        assert!(health.last_cycle.is_none());

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());
    }

    #[tokio::test]
    async fn test_ready_after_completed_cycle() {
        let registry = HealthRegistry::new();
        registry.record_outcome(&completed(1, Vec::new())).await;

        assert!(registry.readiness().await.ready);
        assert_eq!(registry.health().await.last_cycle, Some(1));
    }

    #[tokio::test]
    async fn test_snapshot_failure_marks_inventory_unhealthy() {
        let registry = HealthRegistry::new();
        registry.record_outcome(&completed(1, Vec::new())).await;
        registry
            .record_outcome(&CycleOutcome::Failed {
                cycle: 2,
                operation: Operation::Snapshot,
                error: "aws ec2 describe-instances exited with 255".to_string(),
            })
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert_eq!(
            health.components[components::INVENTORY].status,
            ComponentStatus::Unhealthy
        );
        assert!(!registry.readiness().await.ready);

        // Recovers on the next good cycle
        registry.record_outcome(&completed(3, Vec::new())).await;
        assert!(registry.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_instance_failures_degrade_their_component() {
        let registry = HealthRegistry::new();
        registry
            .record_outcome(&completed(
                1,
                vec![
                    failure("i-1", Operation::FetchMetrics),
                    failure("i-2", Operation::PersistSeries),
                ],
            ))
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components[components::METRIC_SOURCE].status,
            ComponentStatus::Degraded
        );
        assert_eq!(
            health.components[components::SERIES_STORE].status,
            ComponentStatus::Degraded
        );
        assert_eq!(
            health.components[components::TERMINATOR].status,
            ComponentStatus::Healthy
        );
        // Degraded still counts as ready
        assert!(registry.readiness().await.ready);
    }

    #[test]
    fn test_status_ordering() {
        assert!(ComponentStatus::Unhealthy > ComponentStatus::Degraded);
        assert!(ComponentStatus::Degraded > ComponentStatus::Healthy);
    }
}
