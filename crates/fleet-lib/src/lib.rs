//! Fleet monitoring library
//!
//! This crate provides the core functionality for:
//! - Inventory snapshots of provider instances
//! - Instance selection by id, name tag and range
//! - Durable per-instance utilization series with incremental gap fill
//! - Retain/reclaim decisions over windowed utilization
//! - The poll loop tying it all together, plus health and observability

pub mod decision;
pub mod error;
pub mod health;
pub mod inventory;
pub mod models;
pub mod observability;
pub mod poll;
pub mod provider;
pub mod selector;
pub mod store;

pub use error::{FleetError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{FleetMetrics, StructuredLogger};
pub use poll::{CycleOutcome, CycleReport, PollConfig, PollLoop, PollLoopBuilder, PollMode};
