//! Entitlement store - the single writer of entitlement state
//!
//! Every mutation goes through here. The store delegates row atomicity to
//! the backend, then invalidates the cache entry for the touched key before
//! returning, so a read that follows any mutation observes the new value.
//! Call sites cannot skip invalidation because they never talk to the
//! backend directly.

use crate::backend::EntitlementBackend;
use crate::cache::EntitlementCache;
use crate::error::{EntitlementError, Result};
use semver::Version;
use std::sync::Arc;
use telm_types::{
    ActorId, LifecycleEvent, LifecycleEventEnvelope, ModuleKey, TenantEntitlement, TenantId, Tier,
    TierChange,
};
use tokio::sync::{broadcast, RwLock};
use tracing::{info, instrument, warn};

/// Authoritative entitlement store
pub struct EntitlementStore {
    /// Storage seam
    backend: Arc<dyn EntitlementBackend>,
    /// Projection invalidated on every write
    cache: Arc<EntitlementCache>,
    /// Administrative tier changes, retained for compliance queries
    tier_changes: RwLock<Vec<TierChange>>,
    /// Event channel
    event_tx: broadcast::Sender<LifecycleEventEnvelope>,
}

impl EntitlementStore {
    /// Create a new store over a backend and the cache it invalidates
    pub fn new(backend: Arc<dyn EntitlementBackend>, cache: Arc<EntitlementCache>) -> Self {
        let (event_tx, _) = broadcast::channel(4096);
        Self {
            backend,
            cache,
            tier_changes: RwLock::new(Vec::new()),
            event_tx,
        }
    }

    /// Subscribe to entitlement events
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Read one entitlement from the backend, bypassing the cache
    pub async fn get(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
    ) -> Result<Option<TenantEntitlement>> {
        self.backend.get(tenant, module).await
    }

    /// All entitlements belonging to one tenant
    pub async fn list_for_tenant(&self, tenant: &TenantId) -> Result<Vec<TenantEntitlement>> {
        self.backend.list_for_tenant(tenant).await
    }

    /// Distinct tenants holding at least one entitlement row
    pub async fn tenants(&self) -> Result<Vec<TenantId>> {
        self.backend.tenants().await
    }

    /// Create the entitlement row written by a first install.
    ///
    /// Fails with `AlreadyExists` and leaves the existing row untouched if
    /// the (tenant, module) pair already has one.
    #[instrument(skip(self), fields(tenant = %tenant, module = %module, tier = %tier))]
    pub async fn create(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        tier: Tier,
        version: &Version,
    ) -> Result<TenantEntitlement> {
        let entitlement = TenantEntitlement::new(
            tenant.clone(),
            module.clone(),
            tier,
            version.clone(),
        );
        let created = self.backend.create(entitlement).await?;
        self.cache.invalidate(tenant, module);

        info!(tenant = %tenant, module = %module, "Entitlement created");
        Ok(created)
    }

    /// Administrative tier change, logged with the acting identity.
    #[instrument(skip(self), fields(tenant = %tenant, module = %module, to = %new_tier))]
    pub async fn set_tier(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        new_tier: Tier,
        actor: &ActorId,
    ) -> Result<TenantEntitlement> {
        let previous = self
            .backend
            .get(tenant, module)
            .await?
            .ok_or_else(|| EntitlementError::NotFound {
                tenant: tenant.clone(),
                module: module.clone(),
            })?
            .tier;

        let updated = self.backend.set_tier(tenant, module, new_tier).await?;
        self.cache.invalidate(tenant, module);

        let change = TierChange {
            tenant_id: tenant.clone(),
            module_key: module.clone(),
            from: previous,
            to: new_tier,
            actor: actor.clone(),
            changed_at: chrono::Utc::now(),
        };
        if change.is_downgrade() {
            warn!(tenant = %tenant, module = %module, from = %previous, to = %new_tier, actor = %actor, "Tier downgraded");
        } else {
            info!(tenant = %tenant, module = %module, from = %previous, to = %new_tier, actor = %actor, "Tier changed");
        }
        self.tier_changes.write().await.push(change);

        self.emit(
            LifecycleEvent::TierChanged {
                tenant_id: tenant.clone(),
                module_key: module.clone(),
                from: previous,
                to: new_tier,
                actor: actor.clone(),
            },
            Some(actor),
        );

        Ok(updated)
    }

    /// Disable access and record why. The row is kept; entitlements are
    /// never physically deleted.
    #[instrument(skip(self, reason), fields(tenant = %tenant, module = %module))]
    pub async fn disable(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        reason: impl Into<String>,
        actor: &ActorId,
    ) -> Result<TenantEntitlement> {
        let reason = reason.into();
        let updated = self
            .backend
            .set_enabled(tenant, module, false, Some(reason.clone()))
            .await?;
        self.cache.invalidate(tenant, module);

        warn!(tenant = %tenant, module = %module, reason = %reason, actor = %actor, "Entitlement disabled");
        self.emit(
            LifecycleEvent::EntitlementDisabled {
                tenant_id: tenant.clone(),
                module_key: module.clone(),
                reason,
            },
            Some(actor),
        );

        Ok(updated)
    }

    /// Re-enable a previously disabled entitlement
    #[instrument(skip(self), fields(tenant = %tenant, module = %module))]
    pub async fn enable(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        actor: &ActorId,
    ) -> Result<TenantEntitlement> {
        let updated = self.backend.set_enabled(tenant, module, true, None).await?;
        self.cache.invalidate(tenant, module);

        info!(tenant = %tenant, module = %module, actor = %actor, "Entitlement enabled");
        self.emit(
            LifecycleEvent::EntitlementEnabled {
                tenant_id: tenant.clone(),
                module_key: module.clone(),
            },
            Some(actor),
        );

        Ok(updated)
    }

    /// Apply a usage delta and return the new count.
    ///
    /// A rejected delta leaves both the count and the cache untouched, so
    /// the cached row is still accurate.
    pub async fn increment_usage(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        delta: i64,
    ) -> Result<u64> {
        let new_count = self.backend.increment_usage(tenant, module, delta).await?;
        self.cache.invalidate(tenant, module);
        Ok(new_count)
    }

    /// Change the usage ceiling; 0 means unlimited
    #[instrument(skip(self), fields(tenant = %tenant, module = %module, limit = limit))]
    pub async fn set_usage_limit(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        limit: u64,
    ) -> Result<TenantEntitlement> {
        let updated = self.backend.set_usage_limit(tenant, module, limit).await?;
        self.cache.invalidate(tenant, module);

        self.emit(
            LifecycleEvent::UsageLimitChanged {
                tenant_id: tenant.clone(),
                module_key: module.clone(),
                limit,
            },
            None,
        );

        Ok(updated)
    }

    /// Overwrite the usage count with an audited value. Returns the count
    /// the overwrite replaced; emits a reconciliation event only when the
    /// two differ.
    #[instrument(skip(self), fields(tenant = %tenant, module = %module, actual = actual))]
    pub async fn reconcile_usage(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        actual: u64,
    ) -> Result<u64> {
        let recorded = self.backend.reconcile_usage(tenant, module, actual).await?;
        self.cache.invalidate(tenant, module);

        if recorded != actual {
            warn!(
                tenant = %tenant,
                module = %module,
                recorded = recorded,
                actual = actual,
                "Usage drift corrected"
            );
            self.emit(
                LifecycleEvent::UsageReconciled {
                    tenant_id: tenant.clone(),
                    module_key: module.clone(),
                    recorded,
                    actual,
                },
                None,
            );
        }

        Ok(recorded)
    }

    /// Stamp `last_audited_at` after a clean audit
    pub async fn mark_audited(&self, tenant: &TenantId, module: &ModuleKey) -> Result<()> {
        self.backend.mark_audited(tenant, module).await?;
        self.cache.invalidate(tenant, module);
        Ok(())
    }

    /// Record the version a completed install left the tenant on
    pub async fn record_install(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        version: &Version,
    ) -> Result<TenantEntitlement> {
        let updated = self.backend.record_install(tenant, module, version).await?;
        self.cache.invalidate(tenant, module);
        Ok(updated)
    }

    /// Administrative tier changes recorded so far, oldest first
    pub async fn tier_changes(&self) -> Vec<TierChange> {
        self.tier_changes.read().await.clone()
    }

    fn emit(&self, event: LifecycleEvent, actor: Option<&ActorId>) {
        let mut envelope = LifecycleEventEnvelope::new(event);
        if let Some(actor) = actor {
            envelope = envelope.with_actor(actor.as_str());
        }
        let _ = self.event_tx.send(envelope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::error::EntitlementError;
    use crate::memory::InMemoryEntitlementBackend;
    use telm_types::EventSeverity;

    fn wiring() -> (Arc<InMemoryEntitlementBackend>, Arc<EntitlementCache>, EntitlementStore) {
        let backend = Arc::new(InMemoryEntitlementBackend::new());
        let cache = Arc::new(EntitlementCache::new(
            backend.clone(),
            CacheConfig::default(),
        ));
        let store = EntitlementStore::new(backend.clone(), cache.clone());
        (backend, cache, store)
    }

    fn t1() -> TenantId {
        TenantId::new("T1")
    }

    fn card() -> ModuleKey {
        ModuleKey::new("digital_card")
    }

    fn admin() -> ActorId {
        ActorId::new("admin@platform")
    }

    #[tokio::test]
    async fn mutations_are_visible_through_the_cache_immediately() {
        let (_, cache, store) = wiring();
        store
            .create(&t1(), &card(), Tier::BASIC, &Version::new(1, 0, 0))
            .await
            .unwrap();

        // Prime the cache, then mutate through the store
        let row = cache.get(&t1(), &card()).await.unwrap().unwrap();
        assert_eq!(row.tier, Tier::BASIC);

        store.set_tier(&t1(), &card(), Tier(2), &admin()).await.unwrap();
        let row = cache.get(&t1(), &card()).await.unwrap().unwrap();
        assert_eq!(row.tier, Tier(2));

        store.increment_usage(&t1(), &card(), 5).await.unwrap();
        let row = cache.get(&t1(), &card()).await.unwrap().unwrap();
        assert_eq!(row.usage_count, 5);

        store.disable(&t1(), &card(), "billing hold", &admin()).await.unwrap();
        let row = cache.get(&t1(), &card()).await.unwrap().unwrap();
        assert!(!row.enabled);
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let (_, _, store) = wiring();
        store
            .create(&t1(), &card(), Tier::BASIC, &Version::new(1, 0, 0))
            .await
            .unwrap();

        let err = store
            .create(&t1(), &card(), Tier(2), &Version::new(1, 0, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, EntitlementError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn tier_changes_are_logged_with_actor() {
        let (_, _, store) = wiring();
        store
            .create(&t1(), &card(), Tier::BASIC, &Version::new(1, 0, 0))
            .await
            .unwrap();

        store.set_tier(&t1(), &card(), Tier(3), &admin()).await.unwrap();
        store
            .set_tier(&t1(), &card(), Tier(2), &ActorId::new("support@platform"))
            .await
            .unwrap();

        let log = store.tier_changes().await;
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].from, Tier::BASIC);
        assert_eq!(log[0].to, Tier(3));
        assert_eq!(log[0].actor, admin());
        assert!(log[1].is_downgrade());
    }

    #[tokio::test]
    async fn disable_emits_warning_event() {
        let (_, _, store) = wiring();
        let mut events = store.subscribe();
        store
            .create(&t1(), &card(), Tier::BASIC, &Version::new(1, 0, 0))
            .await
            .unwrap();

        store.disable(&t1(), &card(), "billing hold", &admin()).await.unwrap();

        let envelope = events.recv().await.unwrap();
        assert_eq!(envelope.severity, EventSeverity::Warning);
        assert!(matches!(
            envelope.event,
            LifecycleEvent::EntitlementDisabled { ref reason, .. } if reason == "billing hold"
        ));
        assert_eq!(envelope.actor.as_deref(), Some("admin@platform"));
    }

    #[tokio::test]
    async fn reconcile_emits_only_on_drift() {
        let (_, _, store) = wiring();
        let mut events = store.subscribe();
        store
            .create(&t1(), &card(), Tier::BASIC, &Version::new(1, 0, 0))
            .await
            .unwrap();
        store.increment_usage(&t1(), &card(), 50).await.unwrap();

        // No drift: count already matches
        let recorded = store.reconcile_usage(&t1(), &card(), 50).await.unwrap();
        assert_eq!(recorded, 50);

        // Drift: overwrite and report
        let recorded = store.reconcile_usage(&t1(), &card(), 47).await.unwrap();
        assert_eq!(recorded, 50);

        let envelope = events.recv().await.unwrap();
        assert!(matches!(
            envelope.event,
            LifecycleEvent::UsageReconciled { recorded: 50, actual: 47, .. }
        ));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn rejected_increment_keeps_cache_accurate() {
        let (_, cache, store) = wiring();
        store
            .create(&t1(), &card(), Tier::BASIC, &Version::new(1, 0, 0))
            .await
            .unwrap();
        store.set_usage_limit(&t1(), &card(), 10).await.unwrap();
        store.increment_usage(&t1(), &card(), 10).await.unwrap();

        let err = store.increment_usage(&t1(), &card(), 1).await.unwrap_err();
        assert!(matches!(err, EntitlementError::LimitExceeded { .. }));

        let row = cache.get(&t1(), &card()).await.unwrap().unwrap();
        assert_eq!(row.usage_count, 10);
    }
}
