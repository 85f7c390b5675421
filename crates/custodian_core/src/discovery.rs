//! Data discoveries produced by silo scans.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of change a scan detected.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoveryType {
    /// Connector reports a schema with no matching data source
    #[display("DATA_SOURCE_FOUND")]
    DataSourceFound,
    /// Known data source no longer reported
    #[display("DATA_SOURCE_MISSING")]
    DataSourceMissing,
    /// New property on a known data source
    #[display("PROPERTY_FOUND")]
    PropertyFound,
    /// Known property no longer reported
    #[display("PROPERTY_MISSING")]
    PropertyMissing,
}

/// Review status of a discovery.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoveryStatus {
    /// Awaiting review
    #[display("OPEN")]
    Open,
    /// Applied by a reviewer
    #[display("ACCEPTED")]
    Accepted,
    /// Dismissed, or no longer detected
    #[display("REJECTED")]
    Rejected,
}

/// Payload of a discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoveryData {
    /// New data source
    DataSourceFound {
        /// Schema name
        name: String,
        /// Schema group
        group: Option<String>,
        /// Property names the schema declares
        properties: Vec<String>,
    },
    /// Missing data source
    DataSourceMissing {
        /// Id of the data source
        id: String,
    },
    /// New property
    PropertyFound {
        /// Property name
        name: String,
        /// Data source it was found on
        data_source_id: String,
    },
    /// Missing property
    PropertyMissing {
        /// Id of the property
        id: String,
    },
}

/// Identity of a discovery used to match re-detections against open ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DiscoveryKey {
    kind: &'static str,
    parts: Vec<String>,
}

impl DiscoveryData {
    /// Discovery type of this payload.
    pub fn discovery_type(&self) -> DiscoveryType {
        match self {
            DiscoveryData::DataSourceFound { .. } => DiscoveryType::DataSourceFound,
            DiscoveryData::DataSourceMissing { .. } => DiscoveryType::DataSourceMissing,
            DiscoveryData::PropertyFound { .. } => DiscoveryType::PropertyFound,
            DiscoveryData::PropertyMissing { .. } => DiscoveryType::PropertyMissing,
        }
    }

    /// Key data identifying the discovered object, independent of details
    /// such as the property list of a found data source.
    pub fn key(&self) -> DiscoveryKey {
        let (kind, parts) = match self {
            DiscoveryData::DataSourceFound { name, group, .. } => (
                "data_source_found",
                vec![name.clone(), group.clone().unwrap_or_default()],
            ),
            DiscoveryData::DataSourceMissing { id } => ("data_source_missing", vec![id.clone()]),
            DiscoveryData::PropertyFound {
                name,
                data_source_id,
            } => (
                "property_found",
                vec![name.clone(), data_source_id.clone()],
            ),
            DiscoveryData::PropertyMissing { id } => ("property_missing", vec![id.clone()]),
        };
        DiscoveryKey { kind, parts }
    }
}

/// A detected change awaiting review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataDiscovery {
    /// Discovery id
    pub id: String,
    /// Silo the scan ran against
    pub silo_definition_id: String,
    /// Review status
    pub status: DiscoveryStatus,
    /// What was detected
    pub data: DiscoveryData,
    /// When the discovery was first recorded
    pub created_at: DateTime<Utc>,
}

impl DataDiscovery {
    /// Discovery type, derived from the payload.
    pub fn discovery_type(&self) -> DiscoveryType {
        self.data.discovery_type()
    }
}
