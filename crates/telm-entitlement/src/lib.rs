//! TELM Entitlement - Authoritative per-tenant entitlement state
//!
//! This crate owns every TenantEntitlement mutation:
//!
//! - **EntitlementBackend**: storage seam, one atomic operation per mutation
//! - **EntitlementStore**: the single writer; wraps a backend with cache
//!   invalidation, the tier-change audit log and lifecycle events
//! - **EntitlementCache**: read-through, TTL-bounded projection for gate
//!   decisions
//!
//! ## Write path
//!
//! Nothing mutates an entitlement except through the store, and every store
//! mutation invalidates the cache entry for its (tenant, module) key before
//! returning. Callers cannot forget invalidation because it is not their job.
//!
//! ## In-Memory vs Persistent
//!
//! The in-memory backend keeps each row's read-modify-write atomic under a
//! per-key lock. Persistent backends must provide the same guarantee with a
//! row-scoped transaction, using [`checked_usage_delta`] as the reference
//! semantics for usage increments.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod backend;
pub mod cache;
pub mod error;
pub mod memory;
pub mod store;

// Re-exports
pub use backend::{checked_usage_delta, EntitlementBackend, UsageViolation};
pub use cache::{CacheConfig, EntitlementCache, StaleEntry};
pub use error::{EntitlementError, Result};
pub use memory::InMemoryEntitlementBackend;
pub use store::EntitlementStore;
