//! Lifecycle event types
//!
//! Events provide a unified stream of install, entitlement and audit
//! activity for consoles and audit sinks.

use crate::{ActorId, JobId, ModuleKey, TenantId, Tier};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEventEnvelope {
    /// Unique event ID
    pub id: Uuid,

    /// Event timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Event severity
    pub severity: EventSeverity,

    /// Actor who triggered the event
    pub actor: Option<String>,

    /// The actual event
    pub event: LifecycleEvent,
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level event
    Debug,
    /// Informational event
    Info,
    /// Warning event
    Warning,
    /// Error event
    Error,
    /// Critical event requiring immediate attention
    Critical,
}

/// Lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum LifecycleEvent {
    // ═══════════════════════════════════════════════════════════════════
    // INSTALLATION EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// Job moved to a new state
    JobStateChanged {
        job_id: JobId,
        tenant_id: TenantId,
        module_key: ModuleKey,
        state: String,
    },

    /// Install finished successfully
    InstallCompleted {
        job_id: JobId,
        tenant_id: TenantId,
        module_key: ModuleKey,
        version: semver::Version,
        no_op: bool,
    },

    /// Install refused during validation; nothing was applied
    InstallRejected {
        job_id: JobId,
        tenant_id: TenantId,
        module_key: ModuleKey,
        reason: String,
    },

    /// Uninstall finished successfully
    UninstallCompleted {
        job_id: JobId,
        tenant_id: TenantId,
        module_key: ModuleKey,
    },

    /// A step failed and applied steps are being reverted
    RollbackStarted {
        job_id: JobId,
        tenant_id: TenantId,
        module_key: ModuleKey,
        failed_step: String,
    },

    /// Rollback finished and the job failed cleanly
    InstallFailed {
        job_id: JobId,
        tenant_id: TenantId,
        module_key: ModuleKey,
        reason: String,
    },

    /// Rollback could not restore the partition
    ManualInterventionRequired {
        job_id: JobId,
        tenant_id: TenantId,
        module_key: ModuleKey,
        reason: String,
        unreverted: Vec<String>,
    },

    // ═══════════════════════════════════════════════════════════════════
    // ENTITLEMENT EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// Administrative tier change applied
    TierChanged {
        tenant_id: TenantId,
        module_key: ModuleKey,
        from: Tier,
        to: Tier,
        actor: ActorId,
    },

    /// Entitlement disabled with a recorded reason
    EntitlementDisabled {
        tenant_id: TenantId,
        module_key: ModuleKey,
        reason: String,
    },

    /// Previously disabled entitlement re-enabled
    EntitlementEnabled {
        tenant_id: TenantId,
        module_key: ModuleKey,
    },

    /// Usage ceiling changed
    UsageLimitChanged {
        tenant_id: TenantId,
        module_key: ModuleKey,
        limit: u64,
    },

    // ═══════════════════════════════════════════════════════════════════
    // AUDIT EVENTS
    // ═══════════════════════════════════════════════════════════════════
    /// Auditor corrected a drifted usage counter
    UsageReconciled {
        tenant_id: TenantId,
        module_key: ModuleKey,
        recorded: u64,
        actual: u64,
    },
}

impl LifecycleEventEnvelope {
    /// Create a new event envelope
    pub fn new(event: LifecycleEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            severity: Self::infer_severity(&event),
            actor: None,
            event,
        }
    }

    /// Create with actor
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Infer severity from event type
    fn infer_severity(event: &LifecycleEvent) -> EventSeverity {
        match event {
            LifecycleEvent::ManualInterventionRequired { .. } => EventSeverity::Critical,

            LifecycleEvent::InstallFailed { .. } => EventSeverity::Error,

            LifecycleEvent::InstallRejected { .. }
            | LifecycleEvent::RollbackStarted { .. }
            | LifecycleEvent::EntitlementDisabled { .. }
            | LifecycleEvent::UsageReconciled { .. } => EventSeverity::Warning,

            _ => EventSeverity::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_intervention_is_critical() {
        let envelope = LifecycleEventEnvelope::new(LifecycleEvent::ManualInterventionRequired {
            job_id: JobId::generate(),
            tenant_id: TenantId::new("T1"),
            module_key: ModuleKey::new("digital_card"),
            reason: "revert of cards failed".into(),
            unreverted: vec!["cards".into()],
        });
        assert_eq!(envelope.severity, EventSeverity::Critical);
    }

    #[test]
    fn reconciliation_is_a_warning() {
        let envelope = LifecycleEventEnvelope::new(LifecycleEvent::UsageReconciled {
            tenant_id: TenantId::new("T1"),
            module_key: ModuleKey::new("digital_card"),
            recorded: 50,
            actual: 47,
        });
        assert_eq!(envelope.severity, EventSeverity::Warning);
    }

    #[test]
    fn completions_default_to_info() {
        let envelope = LifecycleEventEnvelope::new(LifecycleEvent::InstallCompleted {
            job_id: JobId::generate(),
            tenant_id: TenantId::new("T1"),
            module_key: ModuleKey::new("digital_card"),
            version: semver::Version::new(1, 0, 0),
            no_op: false,
        })
        .with_actor("admin@platform");

        assert_eq!(envelope.severity, EventSeverity::Info);
        assert_eq!(envelope.actor.as_deref(), Some("admin@platform"));
    }
}
