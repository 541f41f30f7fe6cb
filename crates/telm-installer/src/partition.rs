//! Tenant data partition seam
//!
//! The partition executes migration steps against the shared control-plane
//! schema and each tenant's isolated data partition. Steps are idempotent at
//! this boundary: applying an already-applied step, or reverting an
//! already-reverted one, is a no-op rather than an error, which is what makes
//! installer retries safe.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use telm_types::{MigrationStep, TenantId};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

/// Step execution failure at the partition
#[derive(Debug, Error)]
pub enum PartitionError {
    /// The partition could not be reached; the same step may be retried
    #[error("Partition unavailable: {0}")]
    Unavailable(String),

    /// The step itself failed; retrying will not change the outcome
    #[error("Step '{identifier}' failed: {reason}")]
    StepFailed {
        /// Identifier of the failed step
        identifier: String,
        /// What went wrong
        reason: String,
    },
}

impl PartitionError {
    /// Whether retrying the operation can succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result type for partition operations
pub type PartitionResult<T> = std::result::Result<T, PartitionError>;

/// Executes migration steps against tenant and control-plane storage
#[async_trait]
pub trait TenantPartition: Send + Sync {
    /// Apply one step to the shared control-plane schema
    async fn apply_control_plane_step(&self, step: &MigrationStep) -> PartitionResult<()>;

    /// Apply one step to a tenant's isolated partition
    async fn apply_tenant_plane_step(
        &self,
        tenant: &TenantId,
        step: &MigrationStep,
    ) -> PartitionResult<()>;

    /// Undo one control-plane step
    async fn revert_control_plane_step(&self, step: &MigrationStep) -> PartitionResult<()>;

    /// Undo one tenant-plane step
    async fn revert_tenant_plane_step(
        &self,
        tenant: &TenantId,
        step: &MigrationStep,
    ) -> PartitionResult<()>;
}

#[derive(Debug, Default)]
struct PartitionState {
    control_plane: Vec<String>,
    tenant_planes: HashMap<TenantId, Vec<String>>,
}

/// Mock partition for testing.
///
/// Records applied step identifiers per plane so tests can compare the exact
/// partition state before and after a job. Failures are injected per step
/// identifier at construction time.
pub struct MockTenantPartition {
    state: RwLock<PartitionState>,

    /// Steps whose apply fails permanently
    fail_apply: HashSet<String>,

    /// Steps whose revert fails permanently
    fail_revert: HashSet<String>,

    /// Steps whose apply never completes
    stall_apply: HashSet<String>,

    /// Remaining transient apply failures per step
    transient_failures: Mutex<HashMap<String, u32>>,
}

impl MockTenantPartition {
    /// Create a mock partition where every step succeeds
    pub fn new() -> Self {
        Self {
            state: RwLock::new(PartitionState::default()),
            fail_apply: HashSet::new(),
            fail_revert: HashSet::new(),
            stall_apply: HashSet::new(),
            transient_failures: Mutex::new(HashMap::new()),
        }
    }

    /// Make applying `identifier` fail permanently
    pub fn failing_apply(mut self, identifier: impl Into<String>) -> Self {
        self.fail_apply.insert(identifier.into());
        self
    }

    /// Make reverting `identifier` fail permanently
    pub fn failing_revert(mut self, identifier: impl Into<String>) -> Self {
        self.fail_revert.insert(identifier.into());
        self
    }

    /// Make applying `identifier` hang until the caller's timeout fires
    pub fn stalling_apply(mut self, identifier: impl Into<String>) -> Self {
        self.stall_apply.insert(identifier.into());
        self
    }

    /// Make applying `identifier` fail transiently `failures` times before
    /// succeeding
    pub fn transient_apply_failures(
        mut self,
        identifier: impl Into<String>,
        failures: u32,
    ) -> Self {
        self.transient_failures
            .get_mut()
            .insert(identifier.into(), failures);
        self
    }

    /// Control-plane step identifiers currently applied, in apply order
    pub async fn control_plane_steps(&self) -> Vec<String> {
        self.state.read().await.control_plane.clone()
    }

    /// Tenant-plane step identifiers currently applied for one tenant
    pub async fn tenant_plane_steps(&self, tenant: &TenantId) -> Vec<String> {
        self.state
            .read()
            .await
            .tenant_planes
            .get(tenant)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether no step is applied on any plane
    pub async fn is_empty(&self) -> bool {
        let state = self.state.read().await;
        state.control_plane.is_empty()
            && state.tenant_planes.values().all(|steps| steps.is_empty())
    }

    async fn apply(&self, tenant: Option<&TenantId>, step: &MigrationStep) -> PartitionResult<()> {
        if self.stall_apply.contains(&step.identifier) {
            tokio::time::sleep(Duration::from_secs(86_400)).await;
        }

        if let Some(left) = self
            .transient_failures
            .lock()
            .await
            .get_mut(&step.identifier)
        {
            if *left > 0 {
                *left -= 1;
                return Err(PartitionError::Unavailable(
                    "simulated partition outage".to_string(),
                ));
            }
        }

        if self.fail_apply.contains(&step.identifier) {
            return Err(PartitionError::StepFailed {
                identifier: step.identifier.clone(),
                reason: "simulated step failure".to_string(),
            });
        }

        let mut state = self.state.write().await;
        let plane = match tenant {
            Some(tenant) => state.tenant_planes.entry(tenant.clone()).or_default(),
            None => &mut state.control_plane,
        };
        if !plane.contains(&step.identifier) {
            plane.push(step.identifier.clone());
        }
        Ok(())
    }

    async fn revert(&self, tenant: Option<&TenantId>, step: &MigrationStep) -> PartitionResult<()> {
        if self.fail_revert.contains(&step.identifier) {
            return Err(PartitionError::StepFailed {
                identifier: step.identifier.clone(),
                reason: "simulated revert failure".to_string(),
            });
        }

        let mut state = self.state.write().await;
        match tenant {
            Some(tenant) => {
                if let Some(plane) = state.tenant_planes.get_mut(tenant) {
                    plane.retain(|id| id != &step.identifier);
                }
            }
            None => state.control_plane.retain(|id| id != &step.identifier),
        }
        Ok(())
    }
}

impl Default for MockTenantPartition {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TenantPartition for MockTenantPartition {
    async fn apply_control_plane_step(&self, step: &MigrationStep) -> PartitionResult<()> {
        self.apply(None, step).await
    }

    async fn apply_tenant_plane_step(
        &self,
        tenant: &TenantId,
        step: &MigrationStep,
    ) -> PartitionResult<()> {
        self.apply(Some(tenant), step).await
    }

    async fn revert_control_plane_step(&self, step: &MigrationStep) -> PartitionResult<()> {
        self.revert(None, step).await
    }

    async fn revert_tenant_plane_step(
        &self,
        tenant: &TenantId,
        step: &MigrationStep,
    ) -> PartitionResult<()> {
        self.revert(Some(tenant), step).await
    }
}
