//! Planner error types

use telm_types::ModuleKey;
use thiserror::Error;

/// Planner errors
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Malformed descriptor for {key} {version}: {reason}")]
    MalformedDescriptor {
        key: ModuleKey,
        version: semver::Version,
        reason: String,
    },
}

/// Result type for planner operations
pub type Result<T> = std::result::Result<T, PlanError>;
