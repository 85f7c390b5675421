//! Connector protocol error types.

/// Connector-specific error conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum ConnectorErrorKind {
    /// Session could not be opened or was lost
    #[display("Connector session unavailable: {}", _0)]
    SessionUnavailable(String),
    /// Transport failure talking to the connector process
    #[display("Connector transport failed: {}", _0)]
    Transport(String),
    /// Connector exited with a non-zero code
    #[display("Connector exited with non-zero code ({})", _0)]
    NonZeroExit(i64),
    /// Connector produced an unexpected or malformed message
    #[display("Connector protocol violation: {}", _0)]
    Protocol(String),
    /// No schema in the catalog matches the data source
    #[display("No schema found for data source {}", _0)]
    SchemaNotFound(String),
    /// Primary key value missing from the request
    #[display("Primary key value not defined for property {}", _0)]
    MissingPrimaryKey(String),
    /// Extraction payload was missing or malformed
    #[display("Malformed result payload: {}", _0)]
    MalformedPayload(String),
    /// Silo configuration blob could not be used
    #[display("Invalid silo configuration: {}", _0)]
    InvalidConfig(String),
}

impl ConnectorErrorKind {
    /// Check if this error type should be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ConnectorErrorKind::SessionUnavailable(_) | ConnectorErrorKind::Transport(_)
        )
    }

    /// Check if this error describes a data-source level structural problem.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ConnectorErrorKind::SchemaNotFound(_)
                | ConnectorErrorKind::MissingPrimaryKey(_)
                | ConnectorErrorKind::InvalidConfig(_)
        )
    }
}

/// Connector error with source location tracking.
///
/// # Examples
///
/// ```
/// use custodian_error::{ConnectorError, ConnectorErrorKind};
///
/// let err = ConnectorError::new(ConnectorErrorKind::NonZeroExit(2));
/// assert!(format!("{}", err).contains("non-zero code (2)"));
/// assert!(!err.kind.is_retryable());
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Connector Error: {} at line {} in {}", kind, line, file)]
pub struct ConnectorError {
    /// The kind of error that occurred
    pub kind: ConnectorErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl ConnectorError {
    /// Create a new connector error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: ConnectorErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }
}
