//! Scheduled usage reconciliation
//!
//! One auditor execution covers one tenant. The schedule loop sweeps every
//! tenant the store knows, tenant by tenant, inside a per-tick budget.

use crate::error::Result;
use crate::source::UsageSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use telm_entitlement::EntitlementStore;
use telm_types::{ModuleKey, TenantId};
use tokio::sync::RwLock;
use tokio::time::{interval, timeout, Duration};
use tracing::{error, info, instrument, warn};

/// One corrected drift between recorded and actual usage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discrepancy {
    pub tenant_id: TenantId,
    pub module_key: ModuleKey,
    /// Count the store carried before the correction
    pub recorded: u64,
    /// Count recomputed from tenant-plane data, now authoritative
    pub actual: u64,
    pub corrected_at: DateTime<Utc>,
}

impl Discrepancy {
    /// Signed distance from recorded to actual
    pub fn drift(&self) -> i128 {
        self.recorded as i128 - self.actual as i128
    }
}

/// Auditor tuning
#[derive(Debug, Clone)]
pub struct AuditorConfig {
    /// Gap between scheduled sweeps
    pub interval: Duration,
    /// Budget one sweep may spend before it is cut off
    pub tick_budget: Duration,
}

impl Default for AuditorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            tick_budget: Duration::from_secs(300),
        }
    }
}

/// Background correctness sweep over recorded usage.
///
/// Incremental counting may drift under concurrent writers or out-of-band
/// manipulation. The auditor recomputes each tenant's real usage from
/// tenant-plane data and overwrites the recorded count where the two
/// disagree, through the store so cache invalidation and event emission
/// still apply. It never runs on the request path.
pub struct UsageAuditor {
    store: Arc<EntitlementStore>,
    source: Arc<dyn UsageSource>,
    config: AuditorConfig,
    running: RwLock<bool>,
}

impl UsageAuditor {
    /// Create an auditor with default scheduling
    pub fn new(store: Arc<EntitlementStore>, source: Arc<dyn UsageSource>) -> Self {
        Self::with_config(store, source, AuditorConfig::default())
    }

    /// Create an auditor with explicit scheduling
    pub fn with_config(
        store: Arc<EntitlementStore>,
        source: Arc<dyn UsageSource>,
        config: AuditorConfig,
    ) -> Self {
        Self {
            store,
            source,
            config,
            running: RwLock::new(false),
        }
    }

    /// Audit every entitlement one tenant holds.
    ///
    /// Rows whose recomputed count differs from the recorded count are
    /// corrected through the store and reported. Clean rows get their
    /// `last_audited_at` stamp refreshed. A row whose tenant-plane count
    /// cannot be taken is skipped and left for the next sweep.
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub async fn audit_tenant(&self, tenant: &TenantId) -> Result<Vec<Discrepancy>> {
        let mut discrepancies = Vec::new();

        for entitlement in self.store.list_for_tenant(tenant).await? {
            let module = &entitlement.module_key;

            let actual = match self.source.count_usage(tenant, module).await {
                Ok(count) => count,
                Err(err) => {
                    warn!(
                        tenant = %tenant,
                        module = %module,
                        error = %err,
                        "Usage count unavailable, row left unaudited"
                    );
                    continue;
                }
            };

            if actual == entitlement.usage_count {
                self.store.mark_audited(tenant, module).await?;
                continue;
            }

            let recorded = self.store.reconcile_usage(tenant, module, actual).await?;
            discrepancies.push(Discrepancy {
                tenant_id: tenant.clone(),
                module_key: module.clone(),
                recorded,
                actual,
                corrected_at: Utc::now(),
            });
        }

        Ok(discrepancies)
    }

    /// One full sweep over every tenant the store knows.
    ///
    /// Tenants are independent units of work; a tenant whose audit fails
    /// is logged and the sweep moves on.
    pub async fn sweep(&self) -> Result<Vec<Discrepancy>> {
        let mut discrepancies = Vec::new();

        for tenant in self.store.tenants().await? {
            match self.audit_tenant(&tenant).await {
                Ok(found) => discrepancies.extend(found),
                Err(err) => {
                    error!(tenant = %tenant, error = %err, "Tenant audit failed");
                }
            }
        }

        Ok(discrepancies)
    }

    /// One scheduled tick, bounded by the tick budget.
    ///
    /// Returns the corrections made, or `None` when the sweep did not run
    /// to completion. Work cut off by the budget waits for the next
    /// scheduled tick; nothing is retried inline.
    pub async fn tick(&self) -> Option<Vec<Discrepancy>> {
        match timeout(self.config.tick_budget, self.sweep()).await {
            Ok(Ok(discrepancies)) => {
                if !discrepancies.is_empty() {
                    info!(corrected = discrepancies.len(), "Audit sweep corrected usage drift");
                }
                Some(discrepancies)
            }
            Ok(Err(err)) => {
                error!(error = %err, "Audit sweep failed");
                None
            }
            Err(_) => {
                warn!(
                    budget = ?self.config.tick_budget,
                    "Audit sweep exceeded its budget, deferred to the next tick"
                );
                None
            }
        }
    }

    /// Drive the audit schedule until [`UsageAuditor::stop`] is called.
    ///
    /// The first sweep runs immediately, then one per configured interval.
    pub async fn start(self: Arc<Self>) {
        {
            let mut running = self.running.write().await;
            *running = true;
        }
        info!(interval = ?self.config.interval, "Usage auditor started");

        let mut ticker = interval(self.config.interval);
        loop {
            ticker.tick().await;

            if !*self.running.read().await {
                break;
            }
            self.tick().await;
        }

        info!("Usage auditor stopped");
    }

    /// Signal the schedule loop to exit at its next tick
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }
}
