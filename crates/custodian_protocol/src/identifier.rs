//! Matching data sources to catalog schemas and building query identifiers.

use crate::{QueryIdentifier, Record, RequestHandle, RequestStatusMessage, Schema, SchemasMessage};
use custodian_core::DataSource;
use std::collections::HashMap;

/// Identity of an entity within a silo: name plus group, where an absent
/// group equals the empty group.
///
/// # Examples
///
/// ```
/// use custodian_protocol::DataSourceMatcher;
///
/// let a = DataSourceMatcher::new("users", None);
/// let b = DataSourceMatcher::new("users", Some(""));
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("{}/{}", group, name)]
pub struct DataSourceMatcher {
    name: String,
    group: String,
}

impl DataSourceMatcher {
    /// Build a matcher from a name and optional group.
    pub fn new(name: impl Into<String>, group: Option<&str>) -> Self {
        Self {
            name: name.into(),
            group: group.unwrap_or_default().to_string(),
        }
    }

    /// Entity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entity group, empty when absent.
    pub fn group(&self) -> &str {
        &self.group
    }
}

impl From<&Schema> for DataSourceMatcher {
    fn from(schema: &Schema) -> Self {
        Self::new(&schema.name, schema.group.as_deref())
    }
}

impl From<&DataSource> for DataSourceMatcher {
    fn from(ds: &DataSource) -> Self {
        Self::new(ds.name(), ds.group().as_deref())
    }
}

impl From<&RequestHandle> for DataSourceMatcher {
    fn from(handle: &RequestHandle) -> Self {
        Self::new(&handle.schema_name, handle.schema_group.as_deref())
    }
}

impl From<&RequestStatusMessage> for DataSourceMatcher {
    fn from(status: &RequestStatusMessage) -> Self {
        Self::new(&status.schema_name, status.schema_group.as_deref())
    }
}

impl From<&Record> for DataSourceMatcher {
    fn from(record: &Record) -> Self {
        Self::new(&record.stream, record.schema_group.as_deref())
    }
}

impl From<&QueryIdentifier> for DataSourceMatcher {
    fn from(identifier: &QueryIdentifier) -> Self {
        Self::new(&identifier.schema_name, identifier.schema_group.as_deref())
    }
}

/// Index a schema catalog by matcher. Later duplicates win.
pub fn index_schemas(catalog: &SchemasMessage) -> HashMap<DataSourceMatcher, &Schema> {
    catalog
        .schemas
        .iter()
        .map(|schema| (DataSourceMatcher::from(schema), schema))
        .collect()
}

/// Find the catalog schema matching a data source.
pub fn find_schema<'a>(
    catalog: &'a SchemasMessage,
    data_source: &DataSource,
) -> Option<&'a Schema> {
    let wanted = DataSourceMatcher::from(data_source);
    catalog
        .schemas
        .iter()
        .find(|schema| DataSourceMatcher::from(*schema) == wanted)
}

/// JSON schema fragment describing one property.
///
/// Uses `properties.<name>` when the schema describes the property and the
/// whole schema otherwise.
pub fn key_fragment(schema: &Schema, property_name: &str) -> serde_json::Value {
    schema
        .json_schema
        .get("properties")
        .and_then(|props| props.get(property_name))
        .cloned()
        .unwrap_or_else(|| schema.json_schema.clone())
}

/// Build the identifier submitted to a connector for one data source.
///
/// # Examples
///
/// ```
/// use custodian_protocol::{Schema, build_identifier};
///
/// let schema = Schema {
///     name: "users".into(),
///     group: Some("public".into()),
///     json_schema: serde_json::json!({"properties": {"email": {"type": "string"}}}),
/// };
/// let id = build_identifier(&schema, "email", "a@example.com");
/// assert_eq!(id.json_schema, serde_json::json!({"type": "string"}));
/// assert_eq!(id.identifier_query, "a@example.com");
/// ```
pub fn build_identifier(
    schema: &Schema,
    key_property: &str,
    key_value: impl Into<String>,
) -> QueryIdentifier {
    QueryIdentifier {
        schema_name: schema.name.clone(),
        schema_group: schema.group.clone(),
        identifier: key_property.to_string(),
        identifier_query: key_value.into(),
        json_schema: key_fragment(schema, key_property),
    }
}
