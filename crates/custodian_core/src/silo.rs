//! Silo definitions, data sources and properties.

use crate::SecretString;
use derive_builder::Builder;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};

/// Connector image reference for a silo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, Builder)]
#[builder(setter(into))]
pub struct SiloSpecification {
    /// Specification id
    id: String,
    /// Display name
    name: String,
    /// Connector image (program path for local connectors)
    image: String,
    /// Image version tag
    #[builder(default = "String::from(\"latest\")")]
    #[serde(default)]
    tag: String,
    /// Silo has no programmatic connector support
    #[builder(default)]
    #[serde(default)]
    manual: bool,
}

/// One property (column, field) of a data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, Builder)]
#[builder(setter(into))]
pub struct Property {
    /// Property id
    id: String,
    /// Property name as the connector reports it
    name: String,
    /// User primary key this property carries, if any
    #[builder(default)]
    #[serde(default)]
    user_primary_key_id: Option<String>,
}

/// One schema-matched entity within a silo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, Builder)]
#[builder(setter(into))]
pub struct DataSource {
    /// Data source id
    id: String,
    /// Schema name
    name: String,
    /// Schema group; absent means the empty group
    #[builder(default)]
    #[serde(default)]
    group: Option<String>,
    /// Known properties
    #[builder(default)]
    #[serde(default)]
    properties: Vec<Property>,
}

impl DataSource {
    /// The property carrying a user primary key, if any.
    ///
    /// A data source has at most one; the first one wins if the store
    /// holds more.
    pub fn primary_key_property(&self) -> Option<&Property> {
        self.properties
            .iter()
            .find(|p| p.user_primary_key_id.is_some())
    }

    /// Group with absent treated as empty.
    pub fn group_or_empty(&self) -> &str {
        self.group.as_deref().unwrap_or_default()
    }
}

/// One configured connector instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters, Builder)]
#[builder(setter(into))]
pub struct SiloDefinition {
    /// Silo definition id
    id: String,
    /// Owning workspace
    workspace_id: String,
    /// Display name
    name: String,
    /// Connector reference
    specification: SiloSpecification,
    /// Connector configuration blob (JSON)
    #[builder(default)]
    #[serde(default)]
    config: SecretString,
    /// Data sources discovered in this silo
    #[builder(default)]
    #[serde(default)]
    data_sources: Vec<DataSource>,
}

impl SiloDefinition {
    /// Find a data source by id.
    pub fn data_source(&self, id: &str) -> Option<&DataSource> {
        self.data_sources.iter().find(|ds| ds.id == id)
    }

    /// Parse the configuration blob; an empty blob is an empty object.
    pub fn config_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        if self.config.is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        self.config.parse_json()
    }
}
