//! Job records: creation, status updates and their telemetry.

use crate::{RetryPolicy, WorkflowContext, activity};
use chrono::Utc;
use custodian_core::{Job, JobKind, JobStatus, TELEMETRY_TARGET};
use custodian_error::CustodianResult;
use custodian_storage::{LogStore, StatusStore};
use std::sync::Arc;
use tracing::{info, instrument};

/// Creates and updates the aggregate Job record of one run.
#[derive(Clone)]
pub struct JobTracker {
    store: Arc<dyn StatusStore>,
    logs: Arc<dyn LogStore>,
    policy: RetryPolicy,
}

impl JobTracker {
    /// Tracker using the context's store, log store and the orchestrator
    /// retry policy.
    pub fn new(context: &WorkflowContext) -> Self {
        Self {
            store: context.store().clone(),
            logs: context.logs().clone(),
            policy: context.config().orchestrator_retry().clone(),
        }
    }

    /// Return job `id`, creating it with `initial_status` if absent.
    ///
    /// Allocates the job's log artifact; allocation is idempotent, so a
    /// re-delivered call reuses the same artifact.
    ///
    /// # Errors
    ///
    /// Returns the store or log store error once retries are exhausted.
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn find_or_create_job(
        &self,
        id: &str,
        workspace_id: &str,
        kind: JobKind,
        resource_id: &str,
        initial_status: JobStatus,
    ) -> CustodianResult<Job> {
        let log_name = format!("jobs/{}", id);
        let log_object = activity::execute(&self.policy, "create_log", || {
            self.logs.create_log(&log_name)
        })
        .await?;

        let job = Job::new(id, workspace_id, kind, resource_id, initial_status, Utc::now())
            .with_log_object(log_object);
        let job = activity::execute(&self.policy, "find_or_create_job", || {
            self.store.find_or_create_job(job.clone())
        })
        .await?;

        info!(
            target: TELEMETRY_TARGET,
            job_id = %job.id(),
            workspace_id = %job.workspace_id(),
            kind = %job.kind(),
            resource_id = %job.resource_id(),
            status = %job.status(),
            correlation_id = %job.correlation_id(),
            "job started"
        );
        Ok(job)
    }

    /// Overwrite the status of job `id`.
    ///
    /// # Errors
    ///
    /// Returns the store error once retries are exhausted.
    #[instrument(skip(self), fields(job_id = %id))]
    pub async fn update_job_status(&self, id: &str, status: JobStatus) -> CustodianResult<Job> {
        let job = activity::execute(&self.policy, "update_job_status", || {
            self.store.update_job_status(id, status)
        })
        .await?;

        info!(
            target: TELEMETRY_TARGET,
            job_id = %job.id(),
            kind = %job.kind(),
            status = %job.status(),
            correlation_id = %job.correlation_id(),
            "job status changed"
        );
        Ok(job)
    }
}

impl std::fmt::Debug for JobTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTracker")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
