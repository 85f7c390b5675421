//! Error types for orchestration workflows.

/// Error kinds for workflow operations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
pub enum WorkflowErrorKind {
    /// A coordinator actor could not be spawned
    #[display("Failed to spawn coordinator for silo {}: {}", silo_id, reason)]
    SpawnFailed {
        /// Silo the coordinator was meant to drive
        silo_id: String,
        /// Spawn failure detail
        reason: String,
    },

    /// The orchestrator of a job could not be spawned
    #[display("Failed to spawn orchestrator for job {}: {}", job_id, reason)]
    OrchestratorSpawnFailed {
        /// Job the orchestrator was meant to run
        job_id: String,
        /// Spawn failure detail
        reason: String,
    },

    /// Silo bootstrap (session, schema, start) failed
    #[display("Silo {} bootstrap failed: {}", silo_id, reason)]
    SiloBootstrap {
        /// Failed silo
        silo_id: String,
        /// Failure detail
        reason: String,
    },

    /// An actor mailbox was closed before delivery
    #[display("Actor messaging failed: {}", _0)]
    Messaging(String),

    /// Orchestration finished without reporting an outcome
    #[display("Orchestration for job {} ended without an outcome", _0)]
    OutcomeLost(String),

    /// Invalid workflow input
    #[display("Invalid workflow input: {}", _0)]
    InvalidInput(String),
}

/// Error wrapper with location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Workflow Error: {} at line {} in {}", kind, line, file)]
pub struct WorkflowError {
    /// The error kind
    pub kind: WorkflowErrorKind,
    /// Line number where error occurred
    pub line: u32,
    /// File where error occurred
    pub file: &'static str,
}

impl WorkflowError {
    /// Create a new WorkflowError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: WorkflowErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
