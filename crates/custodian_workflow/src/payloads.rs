//! Inbound job trigger payloads.

use serde::{Deserialize, Serialize};

/// Trigger for executing one request across a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequestArgs {
    /// Request to execute
    pub request_id: String,
    /// Caller-supplied job id
    pub job_id: String,
    /// Workspace whose silos are targeted
    pub workspace_id: String,
}

impl ExecuteRequestArgs {
    /// Build an execution trigger.
    pub fn new(
        request_id: impl Into<String>,
        job_id: impl Into<String>,
        workspace_id: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            job_id: job_id.into(),
            workspace_id: workspace_id.into(),
        }
    }
}

/// Trigger for scanning one silo for data source changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverSourcesArgs {
    /// Silo to scan
    pub silo_definition_id: String,
    /// Owning workspace
    pub workspace_id: String,
    /// Caller-supplied job id
    pub job_id: String,
}

impl DiscoverSourcesArgs {
    /// Build a discovery trigger.
    pub fn new(
        silo_definition_id: impl Into<String>,
        workspace_id: impl Into<String>,
        job_id: impl Into<String>,
    ) -> Self {
        Self {
            silo_definition_id: silo_definition_id.into(),
            workspace_id: workspace_id.into(),
            job_id: job_id.into(),
        }
    }
}
