//! In-memory entitlement backend
//!
//! Suitable for development and testing. Each row mutation runs under the
//! DashMap entry lock for its (tenant, module) key, which gives the same
//! per-row serialization a persistent backend gets from a row transaction.

use crate::backend::{checked_usage_delta, EntitlementBackend, UsageViolation};
use crate::error::{EntitlementError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use semver::Version;
use std::sync::atomic::{AtomicBool, Ordering};
use telm_types::{ModuleKey, TenantEntitlement, TenantId, Tier};

/// In-memory entitlement backend
pub struct InMemoryEntitlementBackend {
    rows: DashMap<(TenantId, ModuleKey), TenantEntitlement>,
    available: AtomicBool,
}

impl InMemoryEntitlementBackend {
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate backend outage. While unavailable every operation fails
    /// with [`EntitlementError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EntitlementError::Unavailable(
                "entitlement backend offline".into(),
            ))
        }
    }

    fn with_row<T>(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        mutate: impl FnOnce(&mut TenantEntitlement) -> Result<T>,
    ) -> Result<T> {
        let mut row = self
            .rows
            .get_mut(&(tenant.clone(), module.clone()))
            .ok_or_else(|| EntitlementError::NotFound {
                tenant: tenant.clone(),
                module: module.clone(),
            })?;
        mutate(row.value_mut())
    }
}

impl Default for InMemoryEntitlementBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntitlementBackend for InMemoryEntitlementBackend {
    async fn get(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
    ) -> Result<Option<TenantEntitlement>> {
        self.check_available()?;
        Ok(self
            .rows
            .get(&(tenant.clone(), module.clone()))
            .map(|row| row.clone()))
    }

    async fn create(&self, entitlement: TenantEntitlement) -> Result<TenantEntitlement> {
        self.check_available()?;

        let key = (entitlement.tenant_id.clone(), entitlement.module_key.clone());
        match self.rows.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(EntitlementError::AlreadyExists {
                tenant: entitlement.tenant_id,
                module: entitlement.module_key,
            }),
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(entitlement.clone());
                Ok(entitlement)
            }
        }
    }

    async fn list_for_tenant(&self, tenant: &TenantId) -> Result<Vec<TenantEntitlement>> {
        self.check_available()?;
        Ok(self
            .rows
            .iter()
            .filter(|entry| &entry.key().0 == tenant)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn tenants(&self) -> Result<Vec<TenantId>> {
        self.check_available()?;
        let mut tenants: Vec<TenantId> = self
            .rows
            .iter()
            .map(|entry| entry.key().0.clone())
            .collect();
        tenants.sort();
        tenants.dedup();
        Ok(tenants)
    }

    async fn set_tier(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        tier: Tier,
    ) -> Result<TenantEntitlement> {
        self.check_available()?;
        self.with_row(tenant, module, |row| {
            row.tier = tier;
            Ok(row.clone())
        })
    }

    async fn set_enabled(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        enabled: bool,
        reason: Option<String>,
    ) -> Result<TenantEntitlement> {
        self.check_available()?;
        self.with_row(tenant, module, |row| {
            row.enabled = enabled;
            row.disabled_reason = if enabled { None } else { reason };
            Ok(row.clone())
        })
    }

    async fn increment_usage(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        delta: i64,
    ) -> Result<u64> {
        self.check_available()?;
        self.with_row(tenant, module, |row| {
            match checked_usage_delta(row.usage_count, row.usage_limit, delta) {
                Ok(new_count) => {
                    row.usage_count = new_count;
                    Ok(new_count)
                }
                Err(UsageViolation::Negative) => Err(EntitlementError::NegativeUsage {
                    tenant: tenant.clone(),
                    module: module.clone(),
                }),
                Err(UsageViolation::LimitExceeded { limit }) => {
                    Err(EntitlementError::LimitExceeded {
                        tenant: tenant.clone(),
                        module: module.clone(),
                        limit,
                    })
                }
            }
        })
    }

    async fn set_usage_limit(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        limit: u64,
    ) -> Result<TenantEntitlement> {
        self.check_available()?;
        self.with_row(tenant, module, |row| {
            row.usage_limit = limit;
            Ok(row.clone())
        })
    }

    async fn reconcile_usage(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        actual: u64,
    ) -> Result<u64> {
        self.check_available()?;
        self.with_row(tenant, module, |row| {
            let previous = row.usage_count;
            row.usage_count = actual;
            row.last_audited_at = Some(chrono::Utc::now());
            Ok(previous)
        })
    }

    async fn mark_audited(&self, tenant: &TenantId, module: &ModuleKey) -> Result<()> {
        self.check_available()?;
        self.with_row(tenant, module, |row| {
            row.last_audited_at = Some(chrono::Utc::now());
            Ok(())
        })
    }

    async fn record_install(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        version: &Version,
    ) -> Result<TenantEntitlement> {
        self.check_available()?;
        self.with_row(tenant, module, |row| {
            row.installed_version = version.clone();
            Ok(row.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn entitlement(tenant: &str, module: &str) -> TenantEntitlement {
        TenantEntitlement::new(
            TenantId::new(tenant),
            ModuleKey::new(module),
            Tier::BASIC,
            Version::new(1, 0, 0),
        )
    }

    #[tokio::test]
    async fn create_enforces_uniqueness() {
        let backend = InMemoryEntitlementBackend::new();
        backend.create(entitlement("T1", "digital_card")).await.unwrap();

        let mut second = entitlement("T1", "digital_card");
        second.tier = Tier(3);
        let err = backend.create(second).await.unwrap_err();
        assert!(matches!(err, EntitlementError::AlreadyExists { .. }));

        // The stored row is untouched by the failed create
        let row = backend
            .get(&TenantId::new("T1"), &ModuleKey::new("digital_card"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.tier, Tier::BASIC);
    }

    #[tokio::test]
    async fn rejected_increment_leaves_count_unchanged() {
        let backend = InMemoryEntitlementBackend::new();
        let tenant = TenantId::new("T1");
        let module = ModuleKey::new("digital_card");
        backend
            .create(entitlement("T1", "digital_card").with_usage_limit(10))
            .await
            .unwrap();

        backend.increment_usage(&tenant, &module, 10).await.unwrap();
        let err = backend.increment_usage(&tenant, &module, 1).await.unwrap_err();
        assert!(matches!(err, EntitlementError::LimitExceeded { limit: 10, .. }));

        let row = backend.get(&tenant, &module).await.unwrap().unwrap();
        assert_eq!(row.usage_count, 10);
    }

    #[tokio::test]
    async fn negative_delta_below_zero_is_rejected() {
        let backend = InMemoryEntitlementBackend::new();
        let tenant = TenantId::new("T1");
        let module = ModuleKey::new("digital_card");
        backend.create(entitlement("T1", "digital_card")).await.unwrap();

        backend.increment_usage(&tenant, &module, 2).await.unwrap();
        let err = backend
            .increment_usage(&tenant, &module, -3)
            .await
            .unwrap_err();
        assert!(matches!(err, EntitlementError::NegativeUsage { .. }));

        let row = backend.get(&tenant, &module).await.unwrap().unwrap();
        assert_eq!(row.usage_count, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_never_lose_updates() {
        let backend = Arc::new(InMemoryEntitlementBackend::new());
        let tenant = TenantId::new("T1");
        let module = ModuleKey::new("digital_card");
        backend.create(entitlement("T1", "digital_card")).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let backend = backend.clone();
            let tenant = tenant.clone();
            let module = module.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    backend.increment_usage(&tenant, &module, 1).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let row = backend.get(&tenant, &module).await.unwrap().unwrap();
        assert_eq!(row.usage_count, 800);
    }

    #[tokio::test]
    async fn reconcile_overwrites_and_stamps_audit_time() {
        let backend = InMemoryEntitlementBackend::new();
        let tenant = TenantId::new("T1");
        let module = ModuleKey::new("digital_card");
        backend.create(entitlement("T1", "digital_card")).await.unwrap();
        backend.increment_usage(&tenant, &module, 50).await.unwrap();

        let previous = backend.reconcile_usage(&tenant, &module, 47).await.unwrap();
        assert_eq!(previous, 50);

        let row = backend.get(&tenant, &module).await.unwrap().unwrap();
        assert_eq!(row.usage_count, 47);
        assert!(row.last_audited_at.is_some());
    }

    #[tokio::test]
    async fn unavailable_backend_fails_every_operation() {
        let backend = InMemoryEntitlementBackend::new();
        backend.create(entitlement("T1", "digital_card")).await.unwrap();
        backend.set_available(false);

        let tenant = TenantId::new("T1");
        let module = ModuleKey::new("digital_card");
        assert!(matches!(
            backend.get(&tenant, &module).await.unwrap_err(),
            EntitlementError::Unavailable(_)
        ));
        assert!(matches!(
            backend.increment_usage(&tenant, &module, 1).await.unwrap_err(),
            EntitlementError::Unavailable(_)
        ));

        backend.set_available(true);
        assert!(backend.get(&tenant, &module).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_for_tenant_is_scoped() {
        let backend = InMemoryEntitlementBackend::new();
        backend.create(entitlement("T1", "digital_card")).await.unwrap();
        backend.create(entitlement("T1", "treasury")).await.unwrap();
        backend.create(entitlement("T2", "digital_card")).await.unwrap();

        let rows = backend.list_for_tenant(&TenantId::new("T1")).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.tenant_id == TenantId::new("T1")));
    }

    #[tokio::test]
    async fn tenant_listing_is_deduplicated_and_ordered() {
        let backend = InMemoryEntitlementBackend::new();
        backend.create(entitlement("T2", "digital_card")).await.unwrap();
        backend.create(entitlement("T1", "digital_card")).await.unwrap();
        backend.create(entitlement("T1", "treasury")).await.unwrap();

        let tenants = backend.tenants().await.unwrap();
        assert_eq!(tenants, vec![TenantId::new("T1"), TenantId::new("T2")]);
    }

    #[tokio::test]
    async fn disable_records_reason_and_enable_clears_it() {
        let backend = InMemoryEntitlementBackend::new();
        let tenant = TenantId::new("T1");
        let module = ModuleKey::new("digital_card");
        backend.create(entitlement("T1", "digital_card")).await.unwrap();

        let row = backend
            .set_enabled(&tenant, &module, false, Some("billing hold".into()))
            .await
            .unwrap();
        assert!(!row.enabled);
        assert_eq!(row.disabled_reason.as_deref(), Some("billing hold"));

        let row = backend.set_enabled(&tenant, &module, true, None).await.unwrap();
        assert!(row.enabled);
        assert!(row.disabled_reason.is_none());
    }
}
