//! Gate error types

use thiserror::Error;

/// Gate errors
///
/// Deliberately not a denial: a denied check is a successful decision,
/// while an error means no decision could be made.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Entitlement store unavailable: {0}")]
    StoreUnavailable(String),
}

/// Result type for gate operations
pub type Result<T> = std::result::Result<T, GateError>;
