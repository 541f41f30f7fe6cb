//! TELM Migrate - Migration descriptor scanner
//!
//! This crate turns a module's declared migration groups into an ordered,
//! executable plan:
//!
//! - **MigrationPlanner**: validates a descriptor and emits a [`MigrationPlan`]
//! - **MigrationPlan**: ordered steps for one (module, version, direction)
//!
//! ## Ordering
//!
//! Install plans run every control-plane step before any tenant-plane step,
//! so shared schema exists before tenant data that references it. Uninstall
//! plans run in exact reverse: tenant-plane teardown first, control-plane
//! schema removed last.
//!
//! Plan execution is the installer's job; this crate never performs I/O.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
pub mod planner;

// Re-exports
pub use error::{PlanError, Result};
pub use planner::{MigrationPlan, MigrationPlanner};
