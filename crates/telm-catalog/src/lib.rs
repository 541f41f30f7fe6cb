//! TELM Catalog - Module catalog traits and implementations
//!
//! This crate provides the catalog infrastructure for TELM:
//!
//! - **ModuleCatalog**: Stores published module records (templates for installation)
//! - **InMemoryModuleCatalog**: DashMap-backed implementation
//!
//! ## Append-only
//!
//! The catalog is append-only: a published record is never edited or removed,
//! and a changed module ships as a new version. The single exception is the
//! deprecation flag, which keeps old versions resolvable while refusing new
//! installs of them.
//!
//! ## In-Memory vs Persistent
//!
//! The crate provides an in-memory implementation suitable for development and
//! testing. Production deployments should use persistent backends (PostgreSQL,
//! etcd, etc.) that implement the same trait.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod catalog;
pub mod error;
pub mod memory;

// Re-exports
pub use catalog::ModuleCatalog;
pub use error::{CatalogError, Result};
pub use memory::InMemoryModuleCatalog;
