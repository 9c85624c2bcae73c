//! Error taxonomy for the monitoring core

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T, E = FleetError> = std::result::Result<T, E>;

/// Errors raised by the monitoring core
///
/// None of these are fatal to a watch loop: per-instance errors skip that
/// instance for the current cycle, snapshot errors skip the cycle.
#[derive(Debug, Error)]
pub enum FleetError {
    /// The provider collaborator could not be reached or reported a failure
    #[error("{collaborator} call failed: {message}")]
    Collaborator {
        collaborator: &'static str,
        message: String,
    },

    /// A response or persisted blob did not have the expected shape
    #[error("malformed {what}: {source}")]
    MalformedData {
        what: String,
        #[source]
        source: serde_json::Error,
    },

    /// Local storage could not be read or written
    #[error("series storage failed for {id} at {}: {source}", path.display())]
    Persistence {
        id: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A `lo:hi` selection range could not be parsed
    #[error("invalid selection range '{0}', expected lo:hi")]
    InvalidRange(String),
}

impl FleetError {
    pub fn collaborator(collaborator: &'static str, message: impl Into<String>) -> Self {
        FleetError::Collaborator {
            collaborator,
            message: message.into(),
        }
    }

    pub fn malformed(what: impl Into<String>, source: serde_json::Error) -> Self {
        FleetError::MalformedData {
            what: what.into(),
            source,
        }
    }

    /// Short machine-readable label used in logs and reports
    pub fn kind(&self) -> &'static str {
        match self {
            FleetError::Collaborator { .. } => "collaborator",
            FleetError::MalformedData { .. } => "malformed_data",
            FleetError::Persistence { .. } => "persistence",
            FleetError::InvalidRange(_) => "invalid_range",
        }
    }
}
