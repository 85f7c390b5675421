//! Configuration error types.

/// What went wrong while assembling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ConfigErrorKind {
    /// A configuration source could not be read or merged
    #[display("Failed to load {}: {}", origin, reason)]
    Load {
        /// File or source that failed
        origin: String,
        /// Underlying failure
        reason: String,
    },
    /// Merged values do not fit the expected shape
    #[display("Failed to parse configuration: {}", _0)]
    Parse(String),
    /// A value parsed but is out of range
    #[display("Invalid {}: {}", field, reason)]
    Invalid {
        /// Offending setting
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
    /// Configuration could not be rendered back out
    #[display("Failed to render configuration: {}", _0)]
    Render(String),
    /// The tracing subscriber could not be installed
    #[display("Failed to initialise tracing: {}", _0)]
    Telemetry(String),
}

/// Configuration error with source location.
///
/// # Examples
///
/// ```
/// use custodian_error::{ConfigError, ConfigErrorKind};
///
/// let err = ConfigError::invalid("poll_interval_secs", "must be positive");
/// assert!(matches!(err.kind, ConfigErrorKind::Invalid { field: "poll_interval_secs", .. }));
/// assert!(err.to_string().contains("Invalid poll_interval_secs"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Configuration Error: {} at line {} in {}", kind, line, file)]
pub struct ConfigError {
    /// The kind of error that occurred
    pub kind: ConfigErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl ConfigError {
    /// Create a new configuration error with automatic location tracking.
    #[track_caller]
    pub fn new(kind: ConfigErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Shorthand for an out-of-range setting.
    #[track_caller]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::new(ConfigErrorKind::Invalid {
            field,
            reason: reason.into(),
        })
    }
}
