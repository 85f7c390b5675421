//! Redacting wrapper for sensitive strings.

use serde::{Deserialize, Serialize};

/// A string whose contents never appear in `Debug` or `Display` output.
///
/// Silo configuration blobs, connector handles and extracted records all
/// travel as `SecretString` so that tracing fields cannot leak them.
///
/// # Examples
///
/// ```
/// use custodian_core::SecretString;
///
/// let secret = SecretString::new(r#"{"password":"hunter2"}"#);
/// assert_eq!(format!("{}", secret), "[redacted]");
/// assert!(secret.expose().contains("hunter2"));
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
    /// Wrap a sensitive value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Wrap the JSON encoding of a value.
    pub fn from_json(value: &serde_json::Value) -> Self {
        Self(value.to_string())
    }

    /// Access the underlying value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Parse the underlying value as JSON.
    pub fn parse_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.0)
    }

    /// True when the wrapped string is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([redacted])")
    }
}

impl std::fmt::Display for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[redacted]")
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
