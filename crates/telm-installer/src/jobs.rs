//! Installation job persistence
//!
//! Job records are the durable trail of install and uninstall attempts.
//! They are retained for audit and operator tooling, never consulted for
//! entitlement decisions.

use async_trait::async_trait;
use dashmap::DashMap;
use telm_types::{InstallationJob, JobId, TenantId};
use thiserror::Error;

/// Job store failure
#[derive(Debug, Error)]
pub enum JobStoreError {
    /// Underlying storage failure
    #[error("Job store failure: {0}")]
    Storage(String),
}

/// Result type for job store operations
pub type JobStoreResult<T> = std::result::Result<T, JobStoreError>;

/// Durable store of installation job records
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or replace a job record
    async fn save(&self, job: &InstallationJob) -> JobStoreResult<()>;

    /// Fetch one job by ID
    async fn get(&self, id: &JobId) -> JobStoreResult<Option<InstallationJob>>;

    /// All jobs recorded for a tenant, oldest first
    async fn list_for_tenant(&self, tenant: &TenantId) -> JobStoreResult<Vec<InstallationJob>>;

    /// Jobs that have not reached a terminal state
    async fn list_active(&self) -> JobStoreResult<Vec<InstallationJob>>;
}

/// In-memory job store backed by a concurrent map
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<JobId, InstallationJob>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
        }
    }

    /// Number of stored jobs
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save(&self, job: &InstallationJob) -> JobStoreResult<()> {
        self.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get(&self, id: &JobId) -> JobStoreResult<Option<InstallationJob>> {
        Ok(self.jobs.get(id).map(|job| job.clone()))
    }

    async fn list_for_tenant(&self, tenant: &TenantId) -> JobStoreResult<Vec<InstallationJob>> {
        let mut jobs: Vec<InstallationJob> = self
            .jobs
            .iter()
            .filter(|entry| entry.tenant_id == *tenant)
            .map(|entry| entry.clone())
            .collect();
        jobs.sort_by_key(|job| job.started_at);
        Ok(jobs)
    }

    async fn list_active(&self) -> JobStoreResult<Vec<InstallationJob>> {
        Ok(self
            .jobs
            .iter()
            .filter(|entry| !entry.state.is_terminal())
            .map(|entry| entry.clone())
            .collect())
    }
}
