//! In-memory implementation of the module catalog
//!
//! Suitable for development and testing. Production deployments should use
//! a persistent backend.

use crate::catalog::ModuleCatalog;
use crate::error::{CatalogError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use semver::Version;
use telm_types::{ModuleKey, ModuleRecord, Tier};

/// In-memory module catalog
///
/// Versions of a module are kept in one vector, sorted ascending, so the
/// per-key entry lock makes register's duplicate check atomic.
pub struct InMemoryModuleCatalog {
    modules: DashMap<ModuleKey, Vec<ModuleRecord>>,
}

impl InMemoryModuleCatalog {
    pub fn new() -> Self {
        Self {
            modules: DashMap::new(),
        }
    }
}

impl Default for InMemoryModuleCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn latest_installable(versions: &[ModuleRecord]) -> Option<&ModuleRecord> {
    versions.iter().rev().find(|record| !record.deprecated)
}

#[async_trait]
impl ModuleCatalog for InMemoryModuleCatalog {
    async fn register(&self, record: ModuleRecord) -> Result<ModuleKey> {
        record.validate()?;

        let key = record.key.clone();
        let mut versions = self.modules.entry(key.clone()).or_default();

        if versions.iter().any(|existing| existing.version == record.version) {
            return Err(CatalogError::DuplicateVersion {
                key,
                version: record.version,
            });
        }

        versions.push(record);
        versions.sort_by(|a, b| a.version.cmp(&b.version));

        Ok(key)
    }

    async fn get(&self, key: &ModuleKey, version: &Version) -> Result<ModuleRecord> {
        let versions = self
            .modules
            .get(key)
            .ok_or_else(|| CatalogError::ModuleNotFound(key.clone()))?;

        versions
            .iter()
            .find(|record| &record.version == version)
            .cloned()
            .ok_or_else(|| CatalogError::VersionNotFound {
                key: key.clone(),
                version: version.clone(),
            })
    }

    async fn latest(&self, key: &ModuleKey) -> Result<ModuleRecord> {
        let versions = self
            .modules
            .get(key)
            .ok_or_else(|| CatalogError::ModuleNotFound(key.clone()))?;

        latest_installable(&versions)
            .cloned()
            .ok_or_else(|| CatalogError::NoInstallableVersion(key.clone()))
    }

    async fn list(&self) -> Result<Vec<ModuleRecord>> {
        Ok(self
            .modules
            .iter()
            .filter_map(|entry| latest_installable(entry.value()).cloned())
            .collect())
    }

    async fn list_versions(&self, key: &ModuleKey) -> Result<Vec<ModuleRecord>> {
        let versions = self
            .modules
            .get(key)
            .ok_or_else(|| CatalogError::ModuleNotFound(key.clone()))?;

        Ok(versions.clone())
    }

    async fn list_installable(&self, tier: Tier) -> Result<Vec<ModuleRecord>> {
        Ok(self
            .modules
            .iter()
            .filter_map(|entry| latest_installable(entry.value()).cloned())
            .filter(|record| record.min_tier <= tier)
            .collect())
    }

    async fn deprecate(&self, key: &ModuleKey, version: &Version) -> Result<()> {
        let mut versions = self
            .modules
            .get_mut(key)
            .ok_or_else(|| CatalogError::ModuleNotFound(key.clone()))?;

        let record = versions
            .iter_mut()
            .find(|record| &record.version == version)
            .ok_or_else(|| CatalogError::VersionNotFound {
                key: key.clone(),
                version: version.clone(),
            })?;

        record.deprecated = true;
        Ok(())
    }

    async fn exists(&self, key: &ModuleKey, version: &Version) -> Result<bool> {
        Ok(self
            .modules
            .get(key)
            .map(|versions| versions.iter().any(|record| &record.version == version))
            .unwrap_or(false))
    }
}
