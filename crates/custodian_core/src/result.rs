//! Extracted query results.

use crate::SecretString;
use serde::{Deserialize, Serialize};

/// Shape of an extracted payload.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
pub enum ResultType {
    /// Inline records, stored as a JSON array
    #[serde(rename = "records-json")]
    #[display("records-json")]
    RecordsJson,
    /// Reference to a file produced by the connector
    #[serde(rename = "file")]
    #[display("file")]
    File,
}

/// Extracted payload of a completed Query unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// QueryResult id
    pub id: String,
    /// RequestStatus this result belongs to
    pub request_status_id: String,
    /// Payload shape
    pub result_type: ResultType,
    /// JSON array of records, or the file reference
    pub records: SecretString,
}

impl QueryResult {
    /// Inline records result.
    pub fn records(
        id: impl Into<String>,
        request_status_id: impl Into<String>,
        records: &[serde_json::Value],
    ) -> Self {
        Self {
            id: id.into(),
            request_status_id: request_status_id.into(),
            result_type: ResultType::RecordsJson,
            records: SecretString::from_json(&serde_json::Value::Array(records.to_vec())),
        }
    }

    /// File reference result.
    pub fn file(
        id: impl Into<String>,
        request_status_id: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            request_status_id: request_status_id.into(),
            result_type: ResultType::File,
            records: SecretString::new(path),
        }
    }
}
