//! TELM Types - Core types for the module lifecycle and entitlement registry
//!
//! TELM (Tenant Entitlement & Lifecycle Manager) is the control-plane layer
//! that catalogs installable feature modules, tracks per-tenant subscription
//! state across the landlord/tenant database split, and gates feature access
//! by subscription tier.
//!
//! ## Architectural Boundaries
//!
//! - **TELM** owns: module catalog, entitlement records, installation jobs,
//!   tier gating decisions, usage reconciliation
//! - **Tenant data partitions** own: the actual schema/data each migration
//!   step touches (reached only through the installer's partition seam)
//! - **HTTP / admin surfaces** own: request routing and rendering of gate
//!   denials and job status (out of scope here)
//!
//! ## Key Concepts
//!
//! - **ModuleRecord**: a published, immutable catalog entry for one module
//!   version and its migration descriptor
//! - **TenantEntitlement**: the authoritative per-(tenant, module) record of
//!   tier, enablement and usage
//! - **InstallationJob**: one install/uninstall attempt with a closed state
//!   machine and per-step audit trail
//! - **LifecycleEvent**: unified observability stream for lifecycle activity

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod entitlement;
pub mod events;
pub mod ids;
pub mod job;
pub mod module;

// Re-export main types
pub use entitlement::{MetadataValue, TenantEntitlement, Tier, TierChange};
pub use events::{EventSeverity, LifecycleEvent, LifecycleEventEnvelope};
pub use ids::{ActorId, JobId, ModuleKey, TenantId};
pub use job::{
    InstallationJob, JobState, JobTransitionError, MigrationStep, PlanDirection, StepRecord,
};
pub use module::{MigrationGroup, MigrationScope, ModuleRecord, ModuleValidationError};
