//! Access decision types
//!
//! A decision is either Allowed or Denied with exactly one reason. The
//! reason strings are the wire contract HTTP layers map onto 402/403
//! responses.

use serde::{Deserialize, Serialize};
use telm_types::{TenantEntitlement, Tier};

/// Why access was denied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenialReason {
    /// No entitlement exists for this (tenant, module)
    NotInstalled,

    /// The entitlement exists but is disabled
    Disabled,

    /// The held tier is below what the operation requires
    TierInsufficient {
        /// Tier the tenant holds
        held: Tier,
        /// Tier the operation requires
        required: Tier,
    },

    /// Recorded usage has reached the configured limit
    QuotaExceeded {
        /// Current usage count
        count: u64,
        /// Configured limit
        limit: u64,
    },
}

impl DenialReason {
    /// Stable reason string for HTTP layers and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInstalled => "not_installed",
            Self::Disabled => "disabled",
            Self::TierInsufficient { .. } => "tier_insufficient",
            Self::QuotaExceeded { .. } => "quota_exceeded",
        }
    }
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Access gate decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessDecision {
    /// Operation may proceed
    Allowed,

    /// Operation must not proceed
    Denied {
        /// The single reason that fired
        reason: DenialReason,
    },
}

impl AccessDecision {
    pub fn denied(reason: DenialReason) -> Self {
        Self::Denied { reason }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }

    /// The denial reason, if denied
    pub fn denial_reason(&self) -> Option<&DenialReason> {
        match self {
            Self::Allowed => None,
            Self::Denied { reason } => Some(reason),
        }
    }
}

/// Decide access from an entitlement snapshot.
///
/// Checks run in a fixed order and the first failure wins: existence,
/// enabled flag, tier, quota. `None` means no entitlement exists.
pub fn decide(entitlement: Option<&TenantEntitlement>, required_tier: Tier) -> AccessDecision {
    let Some(entitlement) = entitlement else {
        return AccessDecision::denied(DenialReason::NotInstalled);
    };

    if !entitlement.enabled {
        return AccessDecision::denied(DenialReason::Disabled);
    }

    if entitlement.tier < required_tier {
        return AccessDecision::denied(DenialReason::TierInsufficient {
            held: entitlement.tier,
            required: required_tier,
        });
    }

    if entitlement.at_quota() {
        return AccessDecision::denied(DenialReason::QuotaExceeded {
            count: entitlement.usage_count,
            limit: entitlement.usage_limit,
        });
    }

    AccessDecision::Allowed
}
