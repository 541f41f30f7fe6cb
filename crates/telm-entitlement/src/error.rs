//! Entitlement error types

use telm_types::{ModuleKey, TenantId};
use thiserror::Error;

/// Entitlement errors
#[derive(Debug, Error)]
pub enum EntitlementError {
    #[error("No entitlement for tenant {tenant} module {module}")]
    NotFound { tenant: TenantId, module: ModuleKey },

    #[error("Entitlement already exists for tenant {tenant} module {module}")]
    AlreadyExists { tenant: TenantId, module: ModuleKey },

    #[error("Usage limit {limit} exceeded for tenant {tenant} module {module}")]
    LimitExceeded {
        tenant: TenantId,
        module: ModuleKey,
        limit: u64,
    },

    #[error("Usage delta would drive count negative for tenant {tenant} module {module}")]
    NegativeUsage { tenant: TenantId, module: ModuleKey },

    #[error("Entitlement backend unavailable: {0}")]
    Unavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl EntitlementError {
    /// Whether the error is a transient infrastructure failure worth
    /// retrying, as opposed to a business rejection or caller bug.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Storage(_))
    }
}

/// Result type for entitlement operations
pub type Result<T> = std::result::Result<T, EntitlementError>;
