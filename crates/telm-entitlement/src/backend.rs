//! Entitlement backend trait
//!
//! One method per mutation, each atomic within its (tenant, module) row.
//! Concurrent calls for the same row must serialize; calls for different
//! rows are independent.

use crate::error::Result;
use async_trait::async_trait;
use semver::Version;
use telm_types::{ModuleKey, TenantEntitlement, TenantId, Tier};

/// Storage seam for entitlement rows
#[async_trait]
pub trait EntitlementBackend: Send + Sync {
    /// Read one row
    async fn get(&self, tenant: &TenantId, module: &ModuleKey)
        -> Result<Option<TenantEntitlement>>;

    /// Insert a new row, refusing a (tenant, module) pair that exists
    async fn create(&self, entitlement: TenantEntitlement) -> Result<TenantEntitlement>;

    /// All rows belonging to one tenant
    async fn list_for_tenant(&self, tenant: &TenantId) -> Result<Vec<TenantEntitlement>>;

    /// Distinct tenants holding at least one row, in tenant id order
    async fn tenants(&self) -> Result<Vec<TenantId>>;

    /// Overwrite the tier
    async fn set_tier(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        tier: Tier,
    ) -> Result<TenantEntitlement>;

    /// Flip the enabled flag. Disabling records the reason; enabling
    /// clears it.
    async fn set_enabled(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        enabled: bool,
        reason: Option<String>,
    ) -> Result<TenantEntitlement>;

    /// Apply a usage delta and return the new count.
    ///
    /// The delta is computed against the freshly read count inside the row
    /// lock. A delta that would drive the count negative, or past a non-zero
    /// limit, is rejected with the count unchanged.
    async fn increment_usage(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        delta: i64,
    ) -> Result<u64>;

    /// Overwrite the usage ceiling; 0 means unlimited
    async fn set_usage_limit(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        limit: u64,
    ) -> Result<TenantEntitlement>;

    /// Unconditionally overwrite the usage count with an audited value and
    /// stamp `last_audited_at`. Returns the count the overwrite replaced.
    async fn reconcile_usage(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        actual: u64,
    ) -> Result<u64>;

    /// Stamp `last_audited_at` without changing the count
    async fn mark_audited(&self, tenant: &TenantId, module: &ModuleKey) -> Result<()>;

    /// Record the version a completed install left the tenant on
    async fn record_install(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        version: &Version,
    ) -> Result<TenantEntitlement>;
}

/// Rejected usage delta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageViolation {
    /// Delta would drive the count below zero
    Negative,
    /// Delta would push the count past a non-zero limit
    LimitExceeded { limit: u64 },
}

/// Reference semantics for one usage delta.
///
/// Returns the new count, or the violation that leaves the count unchanged.
/// Every backend's increment implementation must behave exactly like this
/// function applied inside the row's transaction.
pub fn checked_usage_delta(
    count: u64,
    limit: u64,
    delta: i64,
) -> std::result::Result<u64, UsageViolation> {
    // i128 arithmetic keeps u64::MAX counts and i64::MIN deltas exact
    let candidate = count as i128 + delta as i128;

    if candidate < 0 {
        return Err(UsageViolation::Negative);
    }
    if limit > 0 && candidate > limit as i128 {
        return Err(UsageViolation::LimitExceeded { limit });
    }

    Ok(candidate as u64)
}
