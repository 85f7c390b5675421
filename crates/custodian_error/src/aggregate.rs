//! Aggregated failures from fan-out steps.

use crate::{CustodianError, CustodianResult};

/// Several independent failures collected from one step.
///
/// The orchestrator raises it when closing a Job runs into failures it
/// could not recover from, such as a failed reconciliation sweep together
/// with a failed Job status write.
#[derive(Debug, Clone, derive_more::Error)]
pub struct AggregateError {
    /// Individual failures, in the order they were observed
    #[error(not(source))]
    pub causes: Vec<CustodianError>,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl AggregateError {
    /// Collect causes into an aggregate error with location tracking.
    #[track_caller]
    pub fn new(causes: Vec<CustodianError>) -> Self {
        let location = std::panic::Location::caller();
        Self {
            causes,
            line: location.line(),
            file: location.file(),
        }
    }

    /// `Ok` when nothing failed, otherwise every cause as one error.
    ///
    /// # Errors
    ///
    /// Returns an [`AggregateError`] holding `causes` when it is non-empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use custodian_error::{AggregateError, ConfigError};
    ///
    /// assert!(AggregateError::check(vec![]).is_ok());
    /// let err = AggregateError::check(vec![ConfigError::invalid("store_path", "empty").into()])
    ///     .expect_err("one cause fails the step");
    /// assert!(err.to_string().contains("1 failure(s)"));
    /// ```
    #[track_caller]
    pub fn check(causes: Vec<CustodianError>) -> CustodianResult<()> {
        if causes.is_empty() {
            return Ok(());
        }
        Err(Self::new(causes).into())
    }

    /// Number of underlying failures.
    pub fn len(&self) -> usize {
        self.causes.len()
    }

    /// True when no failures were collected.
    pub fn is_empty(&self) -> bool {
        self.causes.is_empty()
    }
}

impl std::fmt::Display for AggregateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Aggregate Error: {} failure(s) at line {} in {}",
            self.causes.len(),
            self.line,
            self.file
        )?;
        for (idx, cause) in self.causes.iter().enumerate() {
            write!(f, "\n  [{}] {}", idx, cause)?;
        }
        Ok(())
    }
}
