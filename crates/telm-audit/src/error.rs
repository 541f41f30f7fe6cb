//! Auditor error types

use telm_entitlement::EntitlementError;
use thiserror::Error;

/// Errors surfaced by an audit sweep.
///
/// A corrected discrepancy is not an error; it is the auditor's job. An
/// `Err` means the sweep could not establish what the usage really is.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The entitlement store refused or could not serve an operation
    #[error(transparent)]
    Store(#[from] EntitlementError),

    /// The tenant-plane usage source could not be counted
    #[error("Usage source failure: {0}")]
    Source(String),
}

/// Result type for audit operations
pub type Result<T> = std::result::Result<T, AuditError>;
