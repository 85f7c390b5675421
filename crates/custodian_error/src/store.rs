//! Status/result store error types.

/// Kinds of store errors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum StoreErrorKind {
    /// Record not found
    #[display("{} not found: {}", entity, id)]
    NotFound {
        /// Entity type (job, request, request status, ...)
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },
    /// Write conflicts with an existing record
    #[display("Conflict: {}", _0)]
    Conflict(String),
    /// Store backend is unavailable
    #[display("Store unavailable: {}", _0)]
    Unavailable(String),
    /// Failed to read persisted state
    #[display("Failed to read store: {}", _0)]
    Read(String),
    /// Failed to write persisted state
    #[display("Failed to write store: {}", _0)]
    Write(String),
    /// Persisted state could not be (de)serialized
    #[display("Store serialization failed: {}", _0)]
    Serialization(String),
    /// Failed to create storage directory
    #[display("Failed to create storage directory: {}", _0)]
    DirectoryCreation(String),
}

impl StoreErrorKind {
    /// Check if this store error is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreErrorKind::Unavailable(_) | StoreErrorKind::Read(_) | StoreErrorKind::Write(_)
        )
    }
}

/// Store error with location tracking.
///
/// # Examples
///
/// ```
/// use custodian_error::{StoreError, StoreErrorKind};
///
/// let err = StoreError::new(StoreErrorKind::NotFound {
///     entity: "job",
///     id: "job-1".to_string(),
/// });
/// assert!(format!("{}", err).contains("job not found"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Store Error: {} at line {} in {}", kind, line, file)]
pub struct StoreError {
    /// The kind of error that occurred
    pub kind: StoreErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl StoreError {
    /// Create a new store error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: StoreErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Shorthand for a missing record.
    #[track_caller]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NotFound {
            entity,
            id: id.into(),
        })
    }
}
