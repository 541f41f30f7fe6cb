//! Installer error types

use telm_types::{JobTransitionError, ModuleKey, TenantId};
use thiserror::Error;

/// Errors surfaced by the installer outside the job lifecycle.
///
/// Validation failures and step failures are not errors here: they terminate
/// the job in `Rejected`, `Failed` or `ManualInterventionRequired`, and
/// `install`/`uninstall` return those jobs as `Ok`. An `Err` means the
/// installer could not produce a reliable job outcome at all.
#[derive(Debug, Error)]
pub enum InstallError {
    /// The catalog could not be read
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// The entitlement store could not be read during validation
    #[error("Entitlement store unavailable: {0}")]
    StoreUnavailable(String),

    /// The job record could not be persisted
    #[error("Job store failure: {0}")]
    JobStore(String),

    /// Uninstall was requested for a module the tenant never installed
    #[error("No entitlement exists for tenant {tenant} and module {module}")]
    NotInstalled {
        /// Tenant the uninstall was requested for
        tenant: TenantId,
        /// Module the uninstall named
        module: ModuleKey,
    },

    /// The installer attempted a state change the job machine refuses
    #[error(transparent)]
    Transition(#[from] JobTransitionError),
}

/// Result type for installer operations
pub type Result<T> = std::result::Result<T, InstallError>;
