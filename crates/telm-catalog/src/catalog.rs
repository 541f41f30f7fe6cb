//! Module catalog trait
//!
//! The ModuleCatalog stores published module records, keyed by
//! (module key, version).

use crate::error::Result;
use async_trait::async_trait;
use semver::Version;
use telm_types::{ModuleKey, ModuleRecord, Tier};

/// Catalog of published module records
#[async_trait]
pub trait ModuleCatalog: Send + Sync {
    /// Publish a new module record.
    ///
    /// Validates the record and refuses a (key, version) pair that is
    /// already published.
    async fn register(&self, record: ModuleRecord) -> Result<ModuleKey>;

    /// Get one published version of a module
    async fn get(&self, key: &ModuleKey, version: &Version) -> Result<ModuleRecord>;

    /// Get the highest non-deprecated version of a module
    async fn latest(&self, key: &ModuleKey) -> Result<ModuleRecord>;

    /// List the latest non-deprecated version of every module
    async fn list(&self) -> Result<Vec<ModuleRecord>>;

    /// List all published versions of a module, lowest version first
    async fn list_versions(&self, key: &ModuleKey) -> Result<Vec<ModuleRecord>>;

    /// List modules a tenant at `tier` may install.
    ///
    /// Returns the latest non-deprecated version of each module whose
    /// minimum tier is at or below the given tier.
    async fn list_installable(&self, tier: Tier) -> Result<Vec<ModuleRecord>>;

    /// Mark one version deprecated. The record stays resolvable via `get`
    /// but is excluded from `latest` and `list_installable`.
    async fn deprecate(&self, key: &ModuleKey, version: &Version) -> Result<()>;

    /// Check whether a (key, version) pair is published
    async fn exists(&self, key: &ModuleKey, version: &Version) -> Result<bool>;
}
