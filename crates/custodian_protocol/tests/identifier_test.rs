use custodian_core::{DataSourceBuilder, PropertyBuilder};
use custodian_protocol::{
    DataSourceMatcher, Schema, SchemasMessage, build_identifier, find_schema, index_schemas,
    key_fragment,
};
use serde_json::json;

fn schema(name: &str, group: Option<&str>) -> Schema {
    Schema {
        name: name.to_string(),
        group: group.map(str::to_string),
        json_schema: json!({
            "type": "object",
            "properties": {
                "email": {"type": "string", "format": "email"},
                "id": {"type": "integer"}
            }
        }),
    }
}

#[test]
fn test_find_schema_matches_name_and_group() {
    let catalog = SchemasMessage {
        schemas: vec![schema("users", Some("public")), schema("users", Some("audit"))],
    };
    let ds = DataSourceBuilder::default()
        .id("ds1")
        .name("users")
        .group(Some("audit".to_string()))
        .build()
        .unwrap();

    let found = find_schema(&catalog, &ds).unwrap();
    assert_eq!(found.group.as_deref(), Some("audit"));
}

#[test]
fn test_absent_group_matches_empty_group() {
    let catalog = SchemasMessage {
        schemas: vec![schema("events", Some(""))],
    };
    let ds = DataSourceBuilder::default()
        .id("ds1")
        .name("events")
        .build()
        .unwrap();

    assert!(find_schema(&catalog, &ds).is_some());
}

#[test]
fn test_missing_schema_is_none() {
    let catalog = SchemasMessage {
        schemas: vec![schema("users", None)],
    };
    let ds = DataSourceBuilder::default()
        .id("ds1")
        .name("orders")
        .properties(vec![
            PropertyBuilder::default()
                .id("p1")
                .name("email")
                .build()
                .unwrap(),
        ])
        .build()
        .unwrap();

    assert!(find_schema(&catalog, &ds).is_none());
}

#[test]
fn test_key_fragment_falls_back_to_whole_schema() {
    let s = schema("users", None);
    assert_eq!(key_fragment(&s, "id"), json!({"type": "integer"}));
    assert_eq!(key_fragment(&s, "phone"), s.json_schema);
}

#[test]
fn test_build_identifier_carries_all_parts() {
    let s = schema("users", Some("public"));
    let id = build_identifier(&s, "email", "jane@example.com");

    assert_eq!(id.schema_name, "users");
    assert_eq!(id.schema_group.as_deref(), Some("public"));
    assert_eq!(id.identifier, "email");
    assert_eq!(id.identifier_query, "jane@example.com");
    assert_eq!(id.json_schema, json!({"type": "string", "format": "email"}));
    assert_eq!(DataSourceMatcher::from(&id), DataSourceMatcher::new("users", Some("public")));
}

#[test]
fn test_index_schemas() {
    let catalog = SchemasMessage {
        schemas: vec![schema("a", None), schema("b", Some("g"))],
    };
    let index = index_schemas(&catalog);
    assert_eq!(index.len(), 2);
    assert!(index.contains_key(&DataSourceMatcher::new("b", Some("g"))));
}

#[test]
fn test_schema_property_names() {
    let mut names = schema("users", None).property_names();
    names.sort();
    assert_eq!(names, vec!["email".to_string(), "id".to_string()]);
}
