//! Installation job types
//!
//! An InstallationJob tracks one install or uninstall run through its state
//! machine. The job record is the durable trail of what was attempted, which
//! steps applied, and where a failed run left the tenant partition.

use crate::{JobId, MigrationScope, ModuleKey, TenantId};
use serde::{Deserialize, Serialize};

/// Direction a migration plan runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanDirection {
    /// Apply groups in descriptor order
    Install,
    /// Revert groups in reverse descriptor order
    Uninstall,
}

impl PlanDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Uninstall => "uninstall",
        }
    }
}

impl std::fmt::Display for PlanDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One planned, ordered migration step.
///
/// Derived from a descriptor group by the planner; `sequence` is the position
/// in the plan being executed, not the position in the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStep {
    /// Execution position within the plan, starting at 0
    pub sequence: u32,

    /// Plane this step touches
    pub scope: MigrationScope,

    /// Descriptor group identifier
    pub identifier: String,

    /// Primary table the step touches (informational)
    pub table_hint: Option<String>,

    /// Whether the step can be reverted
    pub reversible: bool,
}

/// Execution record for one step of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// The planned step
    pub step: MigrationStep,

    /// Set when the step was applied to the partition
    pub applied_at: Option<chrono::DateTime<chrono::Utc>>,

    /// Set when the step was reverted during rollback
    pub reverted_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl StepRecord {
    pub fn new(step: MigrationStep) -> Self {
        Self {
            step,
            applied_at: None,
            reverted_at: None,
        }
    }

    pub fn mark_applied(&mut self) {
        self.applied_at = Some(chrono::Utc::now());
    }

    pub fn mark_reverted(&mut self) {
        self.reverted_at = Some(chrono::Utc::now());
    }

    /// Whether the step is currently applied and not yet reverted.
    pub fn is_applied(&self) -> bool {
        self.applied_at.is_some() && self.reverted_at.is_none()
    }
}

/// Installation job state machine.
///
/// Terminal states are Rejected, Completed, Failed and
/// ManualInterventionRequired; a job never leaves a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobState {
    /// Created, not yet picked up
    Pending,

    /// Preconditions being checked
    Validating,

    /// A precondition failed; nothing was applied
    Rejected {
        /// Why validation refused the job
        reason: String,
    },

    /// Steps executing against the tenant partition
    Installing {
        /// Sequence of the step currently running
        step: u32,
    },

    /// All steps applied and the entitlement recorded
    Completed {
        /// True when the job found nothing to do
        no_op: bool,
    },

    /// A step failed; applied steps being reverted in reverse order
    RollingBack {
        /// Identifier of the step that failed
        failed_step: String,
    },

    /// Rollback finished; the partition is back at its prior state
    Failed {
        /// The original step failure
        reason: String,
    },

    /// Rollback itself failed; the partition needs an operator
    ManualInterventionRequired {
        /// The rollback failure
        reason: String,
        /// Identifiers of applied steps that could not be reverted
        unreverted: Vec<String>,
    },
}

impl JobState {
    /// Variant name for logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Validating => "validating",
            Self::Rejected { .. } => "rejected",
            Self::Installing { .. } => "installing",
            Self::Completed { .. } => "completed",
            Self::RollingBack { .. } => "rolling_back",
            Self::Failed { .. } => "failed",
            Self::ManualInterventionRequired { .. } => "manual_intervention_required",
        }
    }

    /// Whether the job can never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected { .. }
                | Self::Completed { .. }
                | Self::Failed { .. }
                | Self::ManualInterventionRequired { .. }
        )
    }

    /// Whether `target` is a legal next state.
    pub fn can_transition_to(&self, target: &JobState) -> bool {
        match (self, target) {
            (Self::Pending, Self::Validating) => true,
            // Validating ends in rejection, execution, or a no-op completion
            (Self::Validating, Self::Rejected { .. }) => true,
            (Self::Validating, Self::Installing { .. }) => true,
            (Self::Validating, Self::Completed { no_op }) => *no_op,
            // Installing advances step by step
            (Self::Installing { .. }, Self::Installing { .. }) => true,
            (Self::Installing { .. }, Self::Completed { .. }) => true,
            (Self::Installing { .. }, Self::RollingBack { .. }) => true,
            (Self::RollingBack { .. }, Self::Failed { .. }) => true,
            (Self::RollingBack { .. }, Self::ManualInterventionRequired { .. }) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Attempted state change the machine does not allow.
#[derive(Debug, thiserror::Error)]
#[error("Invalid job transition: {from} -> {to}")]
pub struct JobTransitionError {
    /// State the job was in
    pub from: &'static str,
    /// State the transition requested
    pub to: &'static str,
}

/// One install or uninstall run for a (tenant, module, version) triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallationJob {
    /// Unique job identifier
    pub id: JobId,

    /// Tenant the job runs for
    pub tenant_id: TenantId,

    /// Module being installed or uninstalled
    pub module_key: ModuleKey,

    /// Module version the job targets
    pub target_version: semver::Version,

    /// Install or uninstall
    pub direction: PlanDirection,

    /// Current state machine position
    pub state: JobState,

    /// Per-step execution records, in plan order
    pub steps: Vec<StepRecord>,

    /// Number of times execution has been attempted
    pub attempts: u32,

    /// When the job was created
    pub started_at: chrono::DateTime<chrono::Utc>,

    /// When the job reached a terminal state
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,

    /// Terminal failure reason, mirrored out of the state for flat queries
    pub failure_reason: Option<String>,
}

impl InstallationJob {
    /// Create a new pending job.
    pub fn new(
        tenant_id: TenantId,
        module_key: ModuleKey,
        target_version: semver::Version,
        direction: PlanDirection,
    ) -> Self {
        Self {
            id: JobId::generate(),
            tenant_id,
            module_key,
            target_version,
            direction,
            state: JobState::Pending,
            steps: Vec::new(),
            attempts: 0,
            started_at: chrono::Utc::now(),
            completed_at: None,
            failure_reason: None,
        }
    }

    /// Move the job to `next`, enforcing the transition table.
    ///
    /// Entering a terminal state stamps `completed_at`; entering a failure
    /// state also mirrors the reason into `failure_reason`.
    pub fn transition(&mut self, next: JobState) -> Result<(), JobTransitionError> {
        if !self.state.can_transition_to(&next) {
            return Err(JobTransitionError {
                from: self.state.name(),
                to: next.name(),
            });
        }

        match &next {
            JobState::Rejected { reason }
            | JobState::Failed { reason }
            | JobState::ManualInterventionRequired { reason, .. } => {
                self.failure_reason = Some(reason.clone());
            }
            _ => {}
        }

        if next.is_terminal() {
            self.completed_at = Some(chrono::Utc::now());
        }

        self.state = next;
        Ok(())
    }

    /// Applied-but-not-reverted steps, newest first. This is the rollback
    /// work list, and whatever remains in it after a failed rollback.
    pub fn applied_steps(&self) -> Vec<&StepRecord> {
        let mut applied: Vec<&StepRecord> =
            self.steps.iter().filter(|record| record.is_applied()).collect();
        applied.reverse();
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> InstallationJob {
        InstallationJob::new(
            TenantId::new("T1"),
            ModuleKey::new("digital_card"),
            semver::Version::new(1, 0, 0),
            PlanDirection::Install,
        )
    }

    #[test]
    fn happy_path_transitions() {
        let mut job = job();
        job.transition(JobState::Validating).unwrap();
        job.transition(JobState::Installing { step: 0 }).unwrap();
        job.transition(JobState::Installing { step: 1 }).unwrap();
        job.transition(JobState::Completed { no_op: false }).unwrap();

        assert!(job.state.is_terminal());
        assert!(job.completed_at.is_some());
        assert!(job.failure_reason.is_none());
    }

    #[test]
    fn rollback_path_transitions() {
        let mut job = job();
        job.transition(JobState::Validating).unwrap();
        job.transition(JobState::Installing { step: 0 }).unwrap();
        job.transition(JobState::RollingBack {
            failed_step: "cards".into(),
        })
        .unwrap();
        job.transition(JobState::Failed {
            reason: "step cards failed".into(),
        })
        .unwrap();

        assert_eq!(job.failure_reason.as_deref(), Some("step cards failed"));
    }

    #[test]
    fn terminal_states_do_not_transition() {
        let mut job = job();
        job.transition(JobState::Validating).unwrap();
        job.transition(JobState::Rejected {
            reason: "module not found".into(),
        })
        .unwrap();

        let err = job.transition(JobState::Validating).unwrap_err();
        assert_eq!(err.from, "rejected");
        assert_eq!(err.to, "validating");
    }

    #[test]
    fn pending_cannot_skip_validation() {
        let mut job = job();
        assert!(job.transition(JobState::Installing { step: 0 }).is_err());
        assert!(job
            .transition(JobState::Completed { no_op: false })
            .is_err());
    }

    #[test]
    fn no_op_completion_only_from_validating() {
        let mut job = job();
        job.transition(JobState::Validating).unwrap();
        job.transition(JobState::Completed { no_op: true }).unwrap();
        assert!(matches!(job.state, JobState::Completed { no_op: true }));
    }

    #[test]
    fn applied_steps_are_listed_in_reverse() {
        let mut job = job();
        for sequence in 0..3 {
            let mut record = StepRecord::new(MigrationStep {
                sequence,
                scope: MigrationScope::TenantPlane,
                identifier: format!("step_{sequence}"),
                table_hint: None,
                reversible: true,
            });
            record.mark_applied();
            job.steps.push(record);
        }
        job.steps[2].mark_reverted();

        let applied: Vec<&str> = job
            .applied_steps()
            .iter()
            .map(|record| record.step.identifier.as_str())
            .collect();
        assert_eq!(applied, vec!["step_1", "step_0"]);
    }
}
