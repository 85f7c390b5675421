//! Job records and status aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a job orchestrates.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobKind {
    /// Execute a data-subject request across every silo of a workspace
    #[display("execute_request")]
    ExecuteRequest,
    /// Discover data sources and properties of one silo
    #[display("discover_sources")]
    DiscoverSources,
}

/// Lifecycle status of a job.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, not yet started
    #[display("queued")]
    Queued,
    /// Orchestration in progress
    #[display("running")]
    Running,
    /// Every unit of work succeeded
    #[display("completed")]
    Completed,
    /// No unit of work succeeded
    #[display("failed")]
    Failed,
    /// Some units succeeded and some failed
    #[display("partial_failed")]
    PartialFailed,
}

impl JobStatus {
    /// Whether the job has reached a final status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::PartialFailed
        )
    }

    /// Roll per-silo outcomes up into a job status.
    ///
    /// `Completed` when nothing failed, `Failed` when nothing succeeded,
    /// `PartialFailed` otherwise. A job with no silos has nothing to fail
    /// and is `Completed`.
    ///
    /// # Examples
    ///
    /// ```
    /// use custodian_core::{JobStatus, SiloOutcome};
    ///
    /// let status = JobStatus::aggregate([SiloOutcome::Executed, SiloOutcome::Failed]);
    /// assert_eq!(status, JobStatus::PartialFailed);
    /// assert_eq!(JobStatus::aggregate([]), JobStatus::Completed);
    /// ```
    pub fn aggregate(outcomes: impl IntoIterator<Item = SiloOutcome>) -> JobStatus {
        let mut any_success = false;
        let mut any_failure = false;
        let mut seen = false;

        for outcome in outcomes {
            seen = true;
            any_success |= outcome.has_success();
            any_failure |= outcome.has_failure();
        }

        match (seen, any_success, any_failure) {
            (false, _, _) => JobStatus::Completed,
            (true, _, false) => JobStatus::Completed,
            (true, false, true) => JobStatus::Failed,
            (true, true, true) => JobStatus::PartialFailed,
        }
    }
}

/// Exit status of one Silo Request Coordinator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum SiloOutcome {
    /// No item failed
    #[display("executed")]
    Executed,
    /// At least one item succeeded and at least one failed
    #[display("partial_failed")]
    PartialFailed,
    /// Every item failed, or the silo could not be started
    #[display("failed")]
    Failed,
}

impl SiloOutcome {
    /// Derive a silo outcome from success and failure counts.
    ///
    /// A silo with no failures is `Executed` even when it had nothing to do.
    pub fn from_counts(succeeded: usize, failed: usize) -> SiloOutcome {
        match (succeeded, failed) {
            (_, 0) => SiloOutcome::Executed,
            (0, _) => SiloOutcome::Failed,
            _ => SiloOutcome::PartialFailed,
        }
    }

    /// Whether this outcome includes at least one success.
    pub fn has_success(&self) -> bool {
        matches!(self, SiloOutcome::Executed | SiloOutcome::PartialFailed)
    }

    /// Whether this outcome includes at least one failure.
    pub fn has_failure(&self) -> bool {
        matches!(self, SiloOutcome::PartialFailed | SiloOutcome::Failed)
    }
}

/// One orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_getters::Getters)]
pub struct Job {
    /// Caller-supplied identifier
    id: String,
    /// Owning workspace
    workspace_id: String,
    /// What this job orchestrates
    kind: JobKind,
    /// Request id or silo definition id, depending on kind
    resource_id: String,
    /// Current status
    status: JobStatus,
    /// Reference to the job's log artifact
    log_object: Option<String>,
    /// Correlation id linking telemetry for this run
    correlation_id: String,
    /// Creation time
    created_at: DateTime<Utc>,
    /// Last status change
    updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a job record. Timestamps are supplied by the store.
    pub fn new(
        id: impl Into<String>,
        workspace_id: impl Into<String>,
        kind: JobKind,
        resource_id: impl Into<String>,
        status: JobStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            workspace_id: workspace_id.into(),
            kind,
            resource_id: resource_id.into(),
            status,
            log_object: None,
            correlation_id: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach the job's log artifact reference.
    pub fn with_log_object(mut self, log_object: impl Into<String>) -> Self {
        self.log_object = Some(log_object.into());
        self
    }

    /// Overwrite the status. Returns `false` when the status was already set.
    pub fn set_status(&mut self, status: JobStatus, now: DateTime<Utc>) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        self.updated_at = now;
        true
    }
}
