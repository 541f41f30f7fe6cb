//! TELM Installer - Install and uninstall orchestration
//!
//! One [`ModuleInstaller`] execution drives one [`InstallationJob`] per
//! request:
//!
//! - **Validating**: the module must be published and not deprecated, the
//!   actor authorized, and the request not a retry of a finished job
//! - **Installing**: the migration plan runs against the tenant partition,
//!   control plane before tenant plane, with bounded retries per step
//! - **Completed**: the entitlement row is created or updated last, so a
//!   failed run never leaves a partial entitlement behind
//! - **RollingBack**: a failed step reverts the applied steps in strict
//!   reverse order; a rollback that cannot finish parks the job in
//!   ManualInterventionRequired with the list of steps still applied
//!
//! Collaborators the platform provides are seams here: [`TenantPartition`]
//! executes steps, [`InstallAuthorizer`] answers validation, [`JobStore`]
//! keeps the durable job trail.
//!
//! [`InstallationJob`]: telm_types::InstallationJob

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod authorizer;
pub mod error;
pub mod installer;
pub mod jobs;
pub mod partition;

pub use authorizer::{AllowAllAuthorizer, DenyAllAuthorizer, InstallAuthorizer};
pub use error::{InstallError, Result};
pub use installer::{InstallerConfig, ModuleInstaller};
pub use jobs::{InMemoryJobStore, JobStore, JobStoreError, JobStoreResult};
pub use partition::{MockTenantPartition, PartitionError, PartitionResult, TenantPartition};
