//! Read-through entitlement cache
//!
//! The cache is a projection of the store, keyed by (tenant, module). The
//! TTL bound exists so a missed invalidation self-heals within a known
//! window. Absent rows are cached too, so repeated checks for a module a
//! tenant never installed do not hammer the backend.
//!
//! Expired entries are kept until the next successful refetch: when the
//! backend is down, an expired entry is still the last known good value,
//! and the gate's fallback policy decides whether to serve it.

use crate::backend::EntitlementBackend;
use crate::error::Result;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use telm_types::{ModuleKey, TenantEntitlement, TenantId};
use tokio::time::Instant;

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a fetched entry stays fresh
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    /// None caches "no entitlement exists"
    entitlement: Option<TenantEntitlement>,
    fetched_at: Instant,
}

/// A cache entry past its TTL, exposed for explicit stale-serving fallback
#[derive(Debug, Clone)]
pub struct StaleEntry {
    /// The last value fetched from the backend
    pub entitlement: Option<TenantEntitlement>,
    /// Time since that fetch
    pub age: Duration,
}

/// Read-through, TTL-bounded entitlement cache
pub struct EntitlementCache {
    backend: Arc<dyn EntitlementBackend>,
    entries: DashMap<(TenantId, ModuleKey), CacheEntry>,
    config: CacheConfig,
}

impl EntitlementCache {
    pub fn new(backend: Arc<dyn EntitlementBackend>, config: CacheConfig) -> Self {
        Self {
            backend,
            entries: DashMap::new(),
            config,
        }
    }

    /// Read one entitlement, hitting the backend only when the cached entry
    /// is missing or past its TTL.
    ///
    /// A failed refetch propagates the backend error and leaves the expired
    /// entry in place for [`EntitlementCache::last_known`].
    pub async fn get(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
    ) -> Result<Option<TenantEntitlement>> {
        let key = (tenant.clone(), module.clone());

        if let Some(entry) = self.entries.get(&key) {
            if entry.fetched_at.elapsed() < self.config.ttl {
                return Ok(entry.entitlement.clone());
            }
        }

        let entitlement = self.backend.get(tenant, module).await?;
        self.entries.insert(
            key,
            CacheEntry {
                entitlement: entitlement.clone(),
                fetched_at: Instant::now(),
            },
        );

        Ok(entitlement)
    }

    /// Drop the entry for one (tenant, module) key.
    ///
    /// Called by every store mutation; the next `get` refetches.
    pub fn invalidate(&self, tenant: &TenantId, module: &ModuleKey) {
        self.entries.remove(&(tenant.clone(), module.clone()));
    }

    /// The cached value regardless of freshness, with its age.
    pub fn last_known(&self, tenant: &TenantId, module: &ModuleKey) -> Option<StaleEntry> {
        self.entries
            .get(&(tenant.clone(), module.clone()))
            .map(|entry| StaleEntry {
                entitlement: entry.entitlement.clone(),
                age: entry.fetched_at.elapsed(),
            })
    }

    /// Number of cached keys, fresh or stale
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
