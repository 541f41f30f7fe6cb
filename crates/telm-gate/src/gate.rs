//! Access gate
//!
//! Sits between domain modules and the entitlement cache. A gate always
//! carries an explicit outage fallback; there is no default.

use crate::decision::{decide, AccessDecision};
use crate::error::{GateError, Result};
use std::sync::Arc;
use std::time::Duration;
use telm_entitlement::EntitlementCache;
use telm_types::{ModuleKey, TenantId, Tier};
use tracing::warn;

/// What `check` does when the cache misses and the store is unreachable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableFallback {
    /// Surface `StoreUnavailable` and let the caller refuse the request
    FailClosed,

    /// Decide from the expired cache entry, if one exists and is not older
    /// than `max_stale`; otherwise surface `StoreUnavailable`
    ServeLastKnownGood {
        /// Oldest entry age still acceptable to decide from
        max_stale: Duration,
    },
}

/// Per-request access gate over the entitlement cache
pub struct AccessGate {
    cache: Arc<EntitlementCache>,
    fallback: UnavailableFallback,
}

impl AccessGate {
    /// Create a gate with an explicit outage fallback
    pub fn new(cache: Arc<EntitlementCache>, fallback: UnavailableFallback) -> Self {
        Self { cache, fallback }
    }

    /// Decide whether `tenant` may use `module` at `required_tier`.
    ///
    /// Served from the cache; suspends only on a cache miss. A denial is a
    /// successful decision. `StoreUnavailable` is returned only when the
    /// store is unreachable and the fallback cannot produce a decision.
    pub async fn check(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        required_tier: Tier,
    ) -> Result<AccessDecision> {
        match self.cache.get(tenant, module).await {
            Ok(entitlement) => Ok(decide(entitlement.as_ref(), required_tier)),
            Err(err) => self.fall_back(tenant, module, required_tier, &err),
        }
    }

    fn fall_back(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        required_tier: Tier,
        cause: &telm_entitlement::EntitlementError,
    ) -> Result<AccessDecision> {
        match self.fallback {
            UnavailableFallback::FailClosed => {
                warn!(tenant = %tenant, module = %module, cause = %cause, "Store unreachable, failing closed");
                Err(GateError::StoreUnavailable(cause.to_string()))
            }
            UnavailableFallback::ServeLastKnownGood { max_stale } => {
                match self.cache.last_known(tenant, module) {
                    Some(stale) if stale.age <= max_stale => {
                        warn!(
                            tenant = %tenant,
                            module = %module,
                            age_secs = stale.age.as_secs(),
                            "Store unreachable, deciding from last known entitlement"
                        );
                        Ok(decide(stale.entitlement.as_ref(), required_tier))
                    }
                    Some(stale) => {
                        warn!(
                            tenant = %tenant,
                            module = %module,
                            age_secs = stale.age.as_secs(),
                            max_stale_secs = max_stale.as_secs(),
                            "Store unreachable and last known entitlement too old"
                        );
                        Err(GateError::StoreUnavailable(cause.to_string()))
                    }
                    None => Err(GateError::StoreUnavailable(cause.to_string())),
                }
            }
        }
    }
}
