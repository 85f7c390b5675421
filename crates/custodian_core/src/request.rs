//! Subject requests and their per-data-source units of work.

use crate::SecretString;
use serde::{Deserialize, Serialize};

/// Kind of data-subject request.
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
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequestKind {
    /// Export every record held about the subject
    #[display("query")]
    Query,
    /// Delete every record held about the subject
    #[display("delete")]
    Delete,
}

/// Status of one (request, data source) unit of work.
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
pub enum RequestStatusType {
    /// Created by the administration layer, not yet started
    #[display("created")]
    Created,
    /// Started on the connector, awaiting completion
    #[display("in_progress")]
    InProgress,
    /// The silo has no programmatic connector; a human must act
    #[display("manual_needed")]
    ManualNeeded,
    /// Finished successfully
    #[display("executed")]
    Executed,
    /// Finished unsuccessfully
    #[display("failed")]
    Failed,
}

impl RequestStatusType {
    /// Terminal statuses never change again.
    ///
    /// ```
    /// use custodian_core::RequestStatusType;
    ///
    /// assert!(RequestStatusType::ManualNeeded.is_terminal());
    /// assert!(!RequestStatusType::InProgress.is_terminal());
    /// ```
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatusType::ManualNeeded
                | RequestStatusType::Executed
                | RequestStatusType::Failed
        )
    }
}

/// Value of one user primary key supplied with a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyValue {
    /// The user primary key this value belongs to
    pub user_primary_key_id: String,
    /// Literal key value (email address, user id, ...)
    pub value: String,
}

/// One data-subject request over a workspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Request id
    pub id: String,
    /// Owning workspace
    pub workspace_id: String,
    /// Query or delete
    pub kind: RequestKind,
    /// Key values identifying the subject
    pub primary_key_values: Vec<PrimaryKeyValue>,
    /// Job currently executing this request
    pub job_id: Option<String>,
}

impl Request {
    /// Look up the value supplied for a user primary key.
    pub fn primary_key_value(&self, user_primary_key_id: &str) -> Option<&str> {
        self.primary_key_values
            .iter()
            .find(|pk| pk.user_primary_key_id == user_primary_key_id)
            .map(|pk| pk.value.as_str())
    }
}

/// The per-(request, data source) unit of orchestration state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestStatus {
    /// RequestStatus id
    pub id: String,
    /// Owning request
    pub request_id: String,
    /// Data source this unit targets
    pub data_source_id: String,
    /// Current status
    pub status: RequestStatusType,
    /// Connector-issued resumable handle, persisted as soon as it is issued
    pub handle: Option<SecretString>,
    /// Extracted result, once created
    pub query_result_id: Option<String>,
}

impl RequestStatus {
    /// A freshly created unit of work.
    pub fn new(
        id: impl Into<String>,
        request_id: impl Into<String>,
        data_source_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            request_id: request_id.into(),
            data_source_id: data_source_id.into(),
            status: RequestStatusType::Created,
            handle: None,
            query_result_id: None,
        }
    }
}
