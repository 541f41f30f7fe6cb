//! Per-tenant entitlement records
//!
//! A TenantEntitlement is the authoritative record of what one tenant may use
//! and at what tier. Exactly one record exists per (tenant, module) pair, and
//! only the entitlement store mutates it.

use crate::{ActorId, ModuleKey, TenantId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered subscription tier. A higher tier includes the capabilities of
/// every lower tier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Tier(pub u8);

impl Tier {
    /// Entry-level tier assigned on first install.
    pub const BASIC: Tier = Tier(1);

    pub fn level(&self) -> u8 {
        self.0
    }
}

impl Default for Tier {
    fn default() -> Self {
        Self::BASIC
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tier-{}", self.0)
    }
}

/// Add-on metadata attached to an entitlement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean add-on flag, e.g. `"priority_support": true`
    Flag(bool),
    /// Numeric add-on value, e.g. `"extra_seats": 5`
    Number(i64),
}

/// Authoritative per-tenant record for one module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantEntitlement {
    /// Owning tenant
    pub tenant_id: TenantId,

    /// Module this entitlement covers
    pub module_key: ModuleKey,

    /// Subscription tier the tenant holds for this module
    pub tier: Tier,

    /// Whether access is currently enabled
    pub enabled: bool,

    /// Reason recorded when the entitlement was disabled
    pub disabled_reason: Option<String>,

    /// Recorded usage since install or last reconciliation
    pub usage_count: u64,

    /// Usage ceiling; 0 means unlimited
    pub usage_limit: u64,

    /// Module version the tenant currently has installed
    pub installed_version: semver::Version,

    /// Add-on flags and numeric overrides
    pub metadata: BTreeMap<String, MetadataValue>,

    /// When the entitlement was first created
    pub installed_at: chrono::DateTime<chrono::Utc>,

    /// When the usage auditor last verified this record
    pub last_audited_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TenantEntitlement {
    /// Create the record written on first install: enabled, zero usage,
    /// unlimited quota.
    pub fn new(
        tenant_id: TenantId,
        module_key: ModuleKey,
        tier: Tier,
        installed_version: semver::Version,
    ) -> Self {
        Self {
            tenant_id,
            module_key,
            tier,
            enabled: true,
            disabled_reason: None,
            usage_count: 0,
            usage_limit: 0,
            installed_version,
            metadata: BTreeMap::new(),
            installed_at: chrono::Utc::now(),
            last_audited_at: None,
        }
    }

    pub fn with_usage_limit(mut self, limit: u64) -> Self {
        self.usage_limit = limit;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: MetadataValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Whether recorded usage has reached the configured limit.
    pub fn at_quota(&self) -> bool {
        self.usage_limit > 0 && self.usage_count >= self.usage_limit
    }
}

/// Audit log entry for an administrative tier change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierChange {
    /// Tenant whose entitlement changed
    pub tenant_id: TenantId,

    /// Module the change applies to
    pub module_key: ModuleKey,

    /// Tier before the change
    pub from: Tier,

    /// Tier after the change
    pub to: Tier,

    /// Who requested the change
    pub actor: ActorId,

    /// When the change was applied
    pub changed_at: chrono::DateTime<chrono::Utc>,
}

impl TierChange {
    pub fn is_downgrade(&self) -> bool {
        self.to < self.from
    }
}
