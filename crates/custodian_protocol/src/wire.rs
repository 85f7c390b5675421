//! Messages exchanged with connector processes.
//!
//! Field names follow the connector runner's JSON encoding.

use serde::{Deserialize, Serialize};

/// Kind of request a handle was issued for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestType {
    /// Export
    #[display("QUERY")]
    Query,
    /// Deletion
    #[display("DELETE")]
    Delete,
}

impl From<custodian_core::RequestKind> for RequestType {
    fn from(kind: custodian_core::RequestKind) -> Self {
        match kind {
            custodian_core::RequestKind::Query => RequestType::Query,
            custodian_core::RequestKind::Delete => RequestType::Delete,
        }
    }
}

/// Connector-reported phase of one in-flight operation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Still running
    #[display("PROGRESS")]
    Progress,
    /// Finished, results may be extracted
    #[display("COMPLETE")]
    Complete,
    /// Finished unsuccessfully
    #[display("FAILED")]
    Failed,
}

/// Kind of payload a completed operation produces.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    /// Inline records
    #[display("RECORDS")]
    Records,
    /// A file written by the connector
    #[display("FILE")]
    File,
    /// No payload
    #[default]
    #[display("NONE")]
    None,
}

/// Kind of record yielded during extraction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordType {
    /// A data record
    #[default]
    #[display("RECORD")]
    Record,
    /// A file reference
    #[display("FILE")]
    File,
}

/// One queryable entity described by the connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Entity name
    pub name: String,
    /// Entity group (database, dataset, ...)
    #[serde(default)]
    pub group: Option<String>,
    /// JSON Schema of the entity
    #[serde(default)]
    pub json_schema: serde_json::Value,
}

impl Schema {
    /// Property names declared in the JSON schema.
    pub fn property_names(&self) -> Vec<String> {
        self.json_schema
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Schema catalog of a connector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemasMessage {
    /// Every queryable entity
    pub schemas: Vec<Schema>,
}

/// Identifies the subject's records within one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIdentifier {
    /// Entity name
    pub schema_name: String,
    /// Entity group
    pub schema_group: Option<String>,
    /// Name of the key property
    pub identifier: String,
    /// Literal key value
    pub identifier_query: String,
    /// JSON schema fragment describing the key property
    pub json_schema: serde_json::Value,
}

/// Batch of identifiers submitted in one start call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Identifiers, one per data source
    pub identifiers: Vec<QueryIdentifier>,
}

/// Opaque, connector-issued resumable token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestHandle {
    /// Entity name
    pub schema_name: String,
    /// Entity group
    pub schema_group: Option<String>,
    /// Kind of request issued
    pub request_type: RequestType,
    /// Connector-defined state; never interpreted here
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Batch of handles replayed in one status or extraction call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestsMessage {
    /// Handles, one per in-flight item
    pub handles: Vec<RequestHandle>,
}

/// Phase report for one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestStatusMessage {
    /// Entity name
    pub schema_name: String,
    /// Entity group
    pub schema_group: Option<String>,
    /// Current phase
    pub request_status: Phase,
    /// Payload kind once complete
    #[serde(default)]
    pub data_type: Option<DataType>,
}

/// Start response for one identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestResult {
    /// Initial phase
    pub status: RequestStatusMessage,
    /// Handle to replay on every re-check
    pub handle: RequestHandle,
}

/// One extracted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Entity name the record belongs to
    pub stream: String,
    /// Entity group
    #[serde(default)]
    pub schema_group: Option<String>,
    /// Record payload
    #[serde(default)]
    pub data: serde_json::Value,
    /// Record or file reference
    #[serde(default)]
    pub record_type: RecordType,
    /// Path of the file, for file records
    #[serde(default)]
    pub file: Option<String>,
}

/// One connector log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    /// Log text
    pub message: String,
}

/// Tag of a [`ConnectorMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Connector specification
    #[display("SPEC")]
    Spec,
    /// Schema catalog
    #[display("SCHEMA")]
    Schema,
    /// Extracted record
    #[display("RECORD")]
    Record,
    /// Start response
    #[display("REQUEST_RESULT")]
    RequestResult,
    /// Phase report
    #[display("REQUEST_STATUS")]
    RequestStatus,
    /// Log line
    #[display("LOG")]
    Log,
    /// Configuration validation result
    #[display("VALIDATE")]
    Validate,
}

/// Envelope of one line of connector output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorMessage {
    /// Which payload field is set
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Schema catalog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_msg: Option<SchemasMessage>,
    /// Extracted record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Record>,
    /// Start response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestResult>,
    /// Phase report
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_status: Option<RequestStatusMessage>,
    /// Log line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogMessage>,
}
