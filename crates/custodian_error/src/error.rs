//! Top-level error wrapper types.

use crate::{
    AggregateError, ConfigError, ConnectorError, JsonError, StoreError, StoreErrorKind,
    WorkflowError,
};

/// Every error the engine can surface.
///
/// # Examples
///
/// ```
/// use custodian_error::{CustodianError, ConfigError};
///
/// let err: CustodianError = ConfigError::invalid("poll_interval_secs", "missing").into();
/// assert!(format!("{}", err).contains("Configuration Error"));
/// ```
#[derive(Debug, Clone, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum CustodianErrorKind {
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
    /// JSON serialization/deserialization error
    #[from(JsonError)]
    Json(JsonError),
    /// Status/result store error
    #[from(StoreError)]
    Store(StoreError),
    /// Connector protocol error
    #[from(ConnectorError)]
    Connector(ConnectorError),
    /// Workflow orchestration error
    #[from(WorkflowError)]
    Workflow(WorkflowError),
    /// Several failures from one fan-out step
    #[from(AggregateError)]
    Aggregate(AggregateError),
}

/// Custodian error with kind discrimination.
///
/// # Examples
///
/// ```
/// use custodian_error::{CustodianResult, StoreError};
///
/// fn lookup() -> CustodianResult<()> {
///     Err(StoreError::not_found("job", "job-7"))?
/// }
///
/// assert!(lookup().is_err());
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Custodian Error: {}", _0)]
pub struct CustodianError(Box<CustodianErrorKind>);

impl CustodianError {
    /// Create a new error from a kind.
    pub fn new(kind: CustodianErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &CustodianErrorKind {
        &self.0
    }

    /// Whether a store lookup found no such record.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.kind(),
            CustodianErrorKind::Store(e) if matches!(e.kind, StoreErrorKind::NotFound { .. })
        )
    }

    /// Whether the failed operation may succeed if attempted again.
    ///
    /// Aggregates are retryable only when every cause is.
    pub fn is_retryable(&self) -> bool {
        match self.kind() {
            CustodianErrorKind::Connector(e) => e.kind.is_retryable(),
            CustodianErrorKind::Store(e) => e.kind.is_retryable(),
            CustodianErrorKind::Aggregate(e) => {
                !e.is_empty() && e.causes.iter().all(CustodianError::is_retryable)
            }
            CustodianErrorKind::Config(_)
            | CustodianErrorKind::Json(_)
            | CustodianErrorKind::Workflow(_) => false,
        }
    }
}

// Generic From implementation for any type that converts to CustodianErrorKind
impl<T> From<T> for CustodianError
where
    T: Into<CustodianErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Custodian operations.
pub type CustodianResult<T> = std::result::Result<T, CustodianError>;
