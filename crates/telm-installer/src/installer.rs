//! Install and uninstall orchestration
//!
//! The ModuleInstaller drives one InstallationJob per request through the
//! job state machine: validate against the catalog and the authorization
//! seam, execute the migration plan against the tenant partition, then
//! record the outcome in the entitlement store. Any step failure reverts
//! the applied steps in strict reverse order before the job fails; a
//! rollback that cannot finish parks the job in ManualInterventionRequired
//! rather than leaving a partial state silently.

use crate::authorizer::InstallAuthorizer;
use crate::error::{InstallError, Result};
use crate::jobs::JobStore;
use crate::partition::{PartitionResult, TenantPartition};
use semver::Version;
use std::sync::Arc;
use std::time::Duration;
use telm_catalog::{CatalogError, ModuleCatalog};
use telm_entitlement::{EntitlementError, EntitlementStore};
use telm_migrate::MigrationPlanner;
use telm_types::{
    ActorId, InstallationJob, JobId, JobState, LifecycleEvent, LifecycleEventEnvelope,
    MigrationScope, MigrationStep, ModuleKey, PlanDirection, StepRecord, TenantEntitlement,
    TenantId, Tier,
};
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};
use tracing::{error, info, instrument, warn};

/// Configuration for step execution
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    /// Budget for a single step execution attempt
    pub step_timeout: Duration,

    /// Executions of one step before rollback, counting the first attempt
    pub max_step_attempts: u32,

    /// Backoff before the first retry, doubled for each further retry
    pub retry_backoff: Duration,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            step_timeout: Duration::from_secs(30),
            max_step_attempts: 3,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

/// A step execution failure carried into rollback
struct StepFailure {
    identifier: String,
    reason: String,
}

/// Orchestrates install and uninstall jobs
pub struct ModuleInstaller {
    /// Published module records
    catalog: Arc<dyn ModuleCatalog>,
    /// Plan builder
    planner: MigrationPlanner,
    /// Authoritative entitlement state
    store: Arc<EntitlementStore>,
    /// Step execution seam
    partition: Arc<dyn TenantPartition>,
    /// Authorization seam
    authorizer: Arc<dyn InstallAuthorizer>,
    /// Job record persistence
    jobs: Arc<dyn JobStore>,
    /// Step execution configuration
    config: InstallerConfig,
    /// Event channel
    event_tx: broadcast::Sender<LifecycleEventEnvelope>,
}

impl ModuleInstaller {
    /// Create a new installer over its collaborator seams
    pub fn new(
        catalog: Arc<dyn ModuleCatalog>,
        store: Arc<EntitlementStore>,
        partition: Arc<dyn TenantPartition>,
        authorizer: Arc<dyn InstallAuthorizer>,
        jobs: Arc<dyn JobStore>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(4096);
        Self {
            catalog,
            planner: MigrationPlanner::new(),
            store,
            partition,
            authorizer,
            jobs,
            config: InstallerConfig::default(),
            event_tx,
        }
    }

    /// Replace the default execution configuration
    pub fn with_config(mut self, config: InstallerConfig) -> Self {
        self.config = config;
        self
    }

    /// Subscribe to job lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEventEnvelope> {
        self.event_tx.subscribe()
    }

    /// Fetch one job record
    pub async fn job(&self, id: &JobId) -> Result<Option<InstallationJob>> {
        self.jobs
            .get(id)
            .await
            .map_err(|err| InstallError::JobStore(err.to_string()))
    }

    /// Job history for a tenant, oldest first
    pub async fn jobs_for_tenant(&self, tenant: &TenantId) -> Result<Vec<InstallationJob>> {
        self.jobs
            .list_for_tenant(tenant)
            .await
            .map_err(|err| InstallError::JobStore(err.to_string()))
    }

    /// Install `module` at `version` for `tenant`.
    ///
    /// The returned job is terminal: `Completed` on success (with `no_op`
    /// set when the version was already installed), `Rejected` when
    /// validation refused the request, `Failed` when a step failed and
    /// rollback restored the partition, or `ManualInterventionRequired`
    /// when rollback could not finish. An `Err` means the installer could
    /// not drive the job at all.
    #[instrument(skip(self), fields(tenant = %tenant, module = %module, version = %version))]
    pub async fn install(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        version: &Version,
        actor: &ActorId,
    ) -> Result<InstallationJob> {
        // 1. Open a job record
        let mut job = InstallationJob::new(
            tenant.clone(),
            module.clone(),
            version.clone(),
            PlanDirection::Install,
        );
        self.save(&job).await?;
        self.advance(&mut job, JobState::Validating).await?;

        // 2. Resolve the module record
        let record = match self.catalog.get(module, version).await {
            Ok(record) => record,
            Err(CatalogError::Storage(message)) => {
                return Err(InstallError::CatalogUnavailable(message));
            }
            Err(err) => return self.reject(job, err.to_string()).await,
        };
        if record.deprecated {
            return self
                .reject(job, format!("version {version} of {module} is deprecated"))
                .await;
        }

        // 3. Check authorization
        if !self.authorizer.is_authorized(actor, tenant, module).await {
            return self
                .reject(
                    job,
                    format!("actor '{actor}' is not authorized to install {module} for {tenant}"),
                )
                .await;
        }

        // 4. Re-running a finished install is a no-op
        let existing = self
            .store
            .get(tenant, module)
            .await
            .map_err(|err| InstallError::StoreUnavailable(err.to_string()))?;
        if let Some(entitlement) = &existing {
            if entitlement.enabled && entitlement.installed_version >= *version {
                return self.complete_no_op(job, actor).await;
            }
        }

        // 5. Build and execute the install plan
        let plan = match self.planner.plan(&record, PlanDirection::Install) {
            Ok(plan) => plan,
            Err(err) => return self.reject(job, err.to_string()).await,
        };
        job.steps = plan.steps.into_iter().map(StepRecord::new).collect();
        if let Some(failure) = self.run_steps(&mut job, tenant).await? {
            return self.roll_back(job, tenant, failure).await;
        }

        // 6. Record the entitlement
        let recorded = match &existing {
            None => self
                .store
                .create(tenant, module, Tier::BASIC, version)
                .await
                .map(|_| ()),
            Some(entitlement) => {
                self.record_upgrade(entitlement, tenant, module, version, actor)
                    .await
            }
        };
        match recorded {
            Ok(()) => {}
            // A concurrent install created the row first; the applied steps
            // are idempotent, so converge on completion
            Err(EntitlementError::AlreadyExists { .. }) => {}
            Err(err) => {
                let failure = StepFailure {
                    identifier: "entitlement_record".to_string(),
                    reason: format!("entitlement write failed: {err}"),
                };
                return self.roll_back(job, tenant, failure).await;
            }
        }

        // 7. Complete
        self.advance(&mut job, JobState::Completed { no_op: false })
            .await?;
        self.emit(
            LifecycleEvent::InstallCompleted {
                job_id: job.id.clone(),
                tenant_id: tenant.clone(),
                module_key: module.clone(),
                version: version.clone(),
                no_op: false,
            },
            Some(actor),
        );
        info!(job_id = %job.id, "Install completed");
        Ok(job)
    }

    /// Uninstall `module` for `tenant`, tearing down tenant-plane state
    /// before control-plane state and disabling the entitlement.
    ///
    /// The entitlement row is kept with `enabled=false` and reason
    /// `"uninstalled"`; uninstalling an already-disabled module is a no-op.
    #[instrument(skip(self), fields(tenant = %tenant, module = %module))]
    pub async fn uninstall(
        &self,
        tenant: &TenantId,
        module: &ModuleKey,
        actor: &ActorId,
    ) -> Result<InstallationJob> {
        // 1. Resolve what is installed
        let entitlement = self
            .store
            .get(tenant, module)
            .await
            .map_err(|err| InstallError::StoreUnavailable(err.to_string()))?
            .ok_or_else(|| InstallError::NotInstalled {
                tenant: tenant.clone(),
                module: module.clone(),
            })?;

        // 2. Open a job against the installed version
        let mut job = InstallationJob::new(
            tenant.clone(),
            module.clone(),
            entitlement.installed_version.clone(),
            PlanDirection::Uninstall,
        );
        self.save(&job).await?;
        self.advance(&mut job, JobState::Validating).await?;

        // 3. Check authorization
        if !self.authorizer.is_authorized(actor, tenant, module).await {
            return self
                .reject(
                    job,
                    format!(
                        "actor '{actor}' is not authorized to uninstall {module} for {tenant}"
                    ),
                )
                .await;
        }

        // 4. Re-running a finished uninstall is a no-op
        if !entitlement.enabled {
            return self.complete_no_op(job, actor).await;
        }

        // 5. Plan the teardown from the installed version's descriptor
        let record = match self
            .catalog
            .get(module, &entitlement.installed_version)
            .await
        {
            Ok(record) => record,
            Err(CatalogError::Storage(message)) => {
                return Err(InstallError::CatalogUnavailable(message));
            }
            Err(err) => return self.reject(job, err.to_string()).await,
        };
        let plan = match self.planner.plan(&record, PlanDirection::Uninstall) {
            Ok(plan) => plan,
            Err(err) => return self.reject(job, err.to_string()).await,
        };

        // 6. A module with irreversible steps cannot be torn down
        let irreversible = plan.irreversible_steps();
        if !irreversible.is_empty() {
            let reason = format!(
                "module declares irreversible steps: {}",
                irreversible.join(", ")
            );
            return self.reject(job, reason).await;
        }

        // 7. Execute the teardown, tenant plane first
        job.steps = plan.steps.into_iter().map(StepRecord::new).collect();
        if let Some(failure) = self.run_steps(&mut job, tenant).await? {
            return self.roll_back(job, tenant, failure).await;
        }

        // 8. Disable the entitlement; the row is kept for compliance history
        if let Err(err) = self
            .store
            .disable(tenant, module, "uninstalled", actor)
            .await
        {
            let failure = StepFailure {
                identifier: "entitlement_record".to_string(),
                reason: format!("entitlement write failed: {err}"),
            };
            return self.roll_back(job, tenant, failure).await;
        }

        // 9. Complete
        self.advance(&mut job, JobState::Completed { no_op: false })
            .await?;
        self.emit(
            LifecycleEvent::UninstallCompleted {
                job_id: job.id.clone(),
                tenant_id: tenant.clone(),
                module_key: module.clone(),
            },
            Some(actor),
        );
        info!(job_id = %job.id, "Uninstall completed");
        Ok(job)
    }

    /// Execute every planned step in order. Returns the failure that should
    /// trigger rollback, if any.
    async fn run_steps(
        &self,
        job: &mut InstallationJob,
        tenant: &TenantId,
    ) -> Result<Option<StepFailure>> {
        for index in 0..job.steps.len() {
            let step = job.steps[index].step.clone();
            self.advance(
                job,
                JobState::Installing {
                    step: step.sequence,
                },
            )
            .await?;

            if let Err(reason) = self.run_with_retries(job, tenant, &step, true).await {
                return Ok(Some(StepFailure {
                    identifier: step.identifier,
                    reason,
                }));
            }

            job.steps[index].mark_applied();
            self.save(job).await?;
        }
        Ok(None)
    }

    /// Run one step, retrying transient failures and timeouts with
    /// exponential backoff up to the configured attempt bound.
    async fn run_with_retries(
        &self,
        job: &mut InstallationJob,
        tenant: &TenantId,
        step: &MigrationStep,
        forward: bool,
    ) -> std::result::Result<(), String> {
        let direction = job.direction;
        let mut attempt = 0;
        loop {
            attempt += 1;
            job.attempts += 1;

            let outcome = timeout(
                self.config.step_timeout,
                self.dispatch(tenant, step, direction, forward),
            )
            .await;
            let failure = match outcome {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(err)) if err.is_transient() => err.to_string(),
                Ok(Err(err)) => return Err(err.to_string()),
                Err(_) => format!(
                    "step '{}' timed out after {:?}",
                    step.identifier, self.config.step_timeout
                ),
            };

            if attempt >= self.config.max_step_attempts {
                return Err(failure);
            }

            let backoff = self
                .config
                .retry_backoff
                .saturating_mul(2u32.saturating_pow(attempt - 1));
            warn!(
                step = %step.identifier,
                attempt,
                backoff_ms = backoff.as_millis() as u64,
                "Step failed, retrying"
            );
            sleep(backoff).await;
        }
    }

    /// Map a step onto the partition call it needs.
    ///
    /// Forward execution of an install applies steps and its compensation
    /// reverts them; an uninstall tears down with reverts and compensates by
    /// re-applying.
    async fn dispatch(
        &self,
        tenant: &TenantId,
        step: &MigrationStep,
        direction: PlanDirection,
        forward: bool,
    ) -> PartitionResult<()> {
        let applying = match direction {
            PlanDirection::Install => forward,
            PlanDirection::Uninstall => !forward,
        };
        match (applying, step.scope) {
            (true, MigrationScope::ControlPlane) => {
                self.partition.apply_control_plane_step(step).await
            }
            (true, MigrationScope::TenantPlane) => {
                self.partition.apply_tenant_plane_step(tenant, step).await
            }
            (false, MigrationScope::ControlPlane) => {
                self.partition.revert_control_plane_step(step).await
            }
            (false, MigrationScope::TenantPlane) => {
                self.partition.revert_tenant_plane_step(tenant, step).await
            }
        }
    }

    /// Revert applied steps in strict reverse order, then fail the job.
    ///
    /// An install is compensated by each step's inverse, which an
    /// irreversible step does not have; hitting one parks the job for an
    /// operator with the list of steps still applied.
    async fn roll_back(
        &self,
        mut job: InstallationJob,
        tenant: &TenantId,
        failure: StepFailure,
    ) -> Result<InstallationJob> {
        self.advance(
            &mut job,
            JobState::RollingBack {
                failed_step: failure.identifier.clone(),
            },
        )
        .await?;
        warn!(
            job_id = %job.id,
            failed_step = %failure.identifier,
            "Step failed, reverting applied steps"
        );
        self.emit(
            LifecycleEvent::RollbackStarted {
                job_id: job.id.clone(),
                tenant_id: job.tenant_id.clone(),
                module_key: job.module_key.clone(),
                failed_step: failure.identifier.clone(),
            },
            None,
        );

        let work: Vec<MigrationStep> = job
            .applied_steps()
            .iter()
            .map(|record| record.step.clone())
            .collect();
        for step in work {
            if job.direction == PlanDirection::Install && !step.reversible {
                let reason = format!("step '{}' is not reversible", step.identifier);
                return self.manual_intervention(job, reason).await;
            }

            if let Err(revert_failure) = self.run_with_retries(&mut job, tenant, &step, false).await
            {
                let reason = format!(
                    "revert of step '{}' failed: {revert_failure}",
                    step.identifier
                );
                return self.manual_intervention(job, reason).await;
            }

            if let Some(record) = job
                .steps
                .iter_mut()
                .find(|record| record.step.identifier == step.identifier)
            {
                record.mark_reverted();
            }
            self.save(&job).await?;
        }

        self.advance(
            &mut job,
            JobState::Failed {
                reason: failure.reason.clone(),
            },
        )
        .await?;
        if job.direction == PlanDirection::Install {
            self.emit(
                LifecycleEvent::InstallFailed {
                    job_id: job.id.clone(),
                    tenant_id: job.tenant_id.clone(),
                    module_key: job.module_key.clone(),
                    reason: failure.reason,
                },
                None,
            );
        }
        Ok(job)
    }

    /// Park the job for an operator, retaining which steps are still applied
    async fn manual_intervention(
        &self,
        mut job: InstallationJob,
        reason: String,
    ) -> Result<InstallationJob> {
        let unreverted: Vec<String> = job
            .applied_steps()
            .iter()
            .map(|record| record.step.identifier.clone())
            .collect();

        self.advance(
            &mut job,
            JobState::ManualInterventionRequired {
                reason: reason.clone(),
                unreverted: unreverted.clone(),
            },
        )
        .await?;
        error!(
            job_id = %job.id,
            reason = %reason,
            unreverted = ?unreverted,
            "Rollback could not restore the partition"
        );
        self.emit(
            LifecycleEvent::ManualInterventionRequired {
                job_id: job.id.clone(),
                tenant_id: job.tenant_id.clone(),
                module_key: job.module_key.clone(),
                reason,
                unreverted,
            },
            None,
        );
        Ok(job)
    }

    /// Terminate the job as rejected during validation
    async fn reject(&self, mut job: InstallationJob, reason: String) -> Result<InstallationJob> {
        self.advance(&mut job, JobState::Rejected {
            reason: reason.clone(),
        })
        .await?;
        warn!(job_id = %job.id, reason = %reason, "Job rejected");
        if job.direction == PlanDirection::Install {
            self.emit(
                LifecycleEvent::InstallRejected {
                    job_id: job.id.clone(),
                    tenant_id: job.tenant_id.clone(),
                    module_key: job.module_key.clone(),
                    reason,
                },
                None,
            );
        }
        Ok(job)
    }

    /// Terminate the job as a successful no-op
    async fn complete_no_op(
        &self,
        mut job: InstallationJob,
        actor: &ActorId,
    ) -> Result<InstallationJob> {
        self.advance(&mut job, JobState::Completed { no_op: true })
            .await?;
        info!(job_id = %job.id, "Nothing to do, completing as no-op");
        let event = match job.direction {
            PlanDirection::Install => LifecycleEvent::InstallCompleted {
                job_id: job.id.clone(),
                tenant_id: job.tenant_id.clone(),
                module_key: job.module_key.clone(),
                version: job.target_version.clone(),
                no_op: true,
            },
            PlanDirection::Uninstall => LifecycleEvent::UninstallCompleted {
                job_id: job.id.clone(),
                tenant_id: job.tenant_id.clone(),
                module_key: job.module_key.clone(),
            },
        };
        self.emit(event, Some(actor));
        Ok(job)
    }

    /// Record an upgrade on an existing entitlement, re-enabling it if a
    /// prior uninstall disabled it
    async fn record_upgrade(
        &self,
        existing: &TenantEntitlement,
        tenant: &TenantId,
        module: &ModuleKey,
        version: &Version,
        actor: &ActorId,
    ) -> std::result::Result<(), EntitlementError> {
        self.store.record_install(tenant, module, version).await?;
        if !existing.enabled {
            self.store.enable(tenant, module, actor).await?;
        }
        Ok(())
    }

    /// Move the job to `next`, persist it and emit the state change
    async fn advance(&self, job: &mut InstallationJob, next: JobState) -> Result<()> {
        job.transition(next)?;
        self.save(job).await?;
        self.emit(
            LifecycleEvent::JobStateChanged {
                job_id: job.id.clone(),
                tenant_id: job.tenant_id.clone(),
                module_key: job.module_key.clone(),
                state: job.state.name().to_string(),
            },
            None,
        );
        Ok(())
    }

    async fn save(&self, job: &InstallationJob) -> Result<()> {
        self.jobs
            .save(job)
            .await
            .map_err(|err| InstallError::JobStore(err.to_string()))
    }

    fn emit(&self, event: LifecycleEvent, actor: Option<&ActorId>) {
        let mut envelope = LifecycleEventEnvelope::new(event);
        if let Some(actor) = actor {
            envelope = envelope.with_actor(actor.as_str());
        }
        let _ = self.event_tx.send(envelope);
    }
}
