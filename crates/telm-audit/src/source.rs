//! Tenant-plane usage counting seam

use crate::error::{AuditError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use telm_types::{ModuleKey, TenantId};

/// Counting face of the tenant data partition.
///
/// The adapter that applies migration steps for the installer usually
/// implements this as well; the auditor only ever counts. A count is taken
/// against live tenant-plane data, so the value is authoritative at the
/// moment it is read.
#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Recompute the real usage of one module for one tenant
    async fn count_usage(&self, tenant: &TenantId, module: &ModuleKey) -> Result<u64>;
}

/// In-memory usage source for tests.
///
/// Counts default to zero for keys that were never set, matching a tenant
/// plane that holds no rows for the module. `failing_for` makes counting a
/// module fail; `stalling` makes every count hang, for budget tests.
pub struct MockUsageSource {
    counts: DashMap<(TenantId, ModuleKey), u64>,
    failing: HashSet<ModuleKey>,
    stalled: bool,
    taken: AtomicU64,
}

impl MockUsageSource {
    pub fn new() -> Self {
        Self {
            counts: DashMap::new(),
            failing: HashSet::new(),
            stalled: false,
            taken: AtomicU64::new(0),
        }
    }

    /// Fail every count for the named module
    pub fn failing_for(mut self, module: &str) -> Self {
        self.failing.insert(ModuleKey::new(module));
        self
    }

    /// Hang every count until cancelled
    pub fn stalling(mut self) -> Self {
        self.stalled = true;
        self
    }

    /// Set the actual tenant-plane count for one (tenant, module) pair
    pub fn set_count(&self, tenant: &TenantId, module: &ModuleKey, count: u64) {
        self.counts.insert((tenant.clone(), module.clone()), count);
    }

    /// Number of counts served so far
    pub fn counts_taken(&self) -> u64 {
        self.taken.load(Ordering::SeqCst)
    }
}

impl Default for MockUsageSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsageSource for MockUsageSource {
    async fn count_usage(&self, tenant: &TenantId, module: &ModuleKey) -> Result<u64> {
        if self.stalled {
            tokio::time::sleep(tokio::time::Duration::from_secs(86_400)).await;
        }
        if self.failing.contains(module) {
            return Err(AuditError::Source(format!(
                "tenant plane for '{module}' offline"
            )));
        }

        self.taken.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .counts
            .get(&(tenant.clone(), module.clone()))
            .map(|count| *count)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unset_keys_count_zero() {
        let source = MockUsageSource::new();
        let count = source
            .count_usage(&TenantId::new("T1"), &ModuleKey::new("digital_card"))
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn set_counts_are_served_per_tenant() {
        let source = MockUsageSource::new();
        let tenant = TenantId::new("T1");
        let module = ModuleKey::new("digital_card");
        source.set_count(&tenant, &module, 47);

        assert_eq!(source.count_usage(&tenant, &module).await.unwrap(), 47);
        assert_eq!(
            source
                .count_usage(&TenantId::new("T2"), &module)
                .await
                .unwrap(),
            0
        );
        assert_eq!(source.counts_taken(), 2);
    }

    #[tokio::test]
    async fn failing_module_errors_without_counting() {
        let source = MockUsageSource::new().failing_for("digital_card");
        let err = source
            .count_usage(&TenantId::new("T1"), &ModuleKey::new("digital_card"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::Source(_)));
        assert_eq!(source.counts_taken(), 0);
    }
}
