use custodian_core::SiloSpecificationBuilder;
use custodian_protocol::{
    ConnectorCall, ConnectorFactory, DataSourceMatcher, DataType, EntityScript, Phase, Query,
    RecordType, RequestsMessage, Schema, Script, ScriptedConnector, ScriptedFactory,
    build_identifier,
};
use serde_json::json;

fn users() -> Schema {
    Schema {
        name: "users".into(),
        group: None,
        json_schema: json!({"properties": {"email": {"type": "string"}}}),
    }
}

fn spec(image: &str) -> custodian_core::SiloSpecification {
    SiloSpecificationBuilder::default()
        .id("spec")
        .name("scripted")
        .image(image)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_phases_advance_per_status_check() {
    let connector = ScriptedConnector::new(Script::new().entity(
        users(),
        EntityScript::new(vec![Phase::Progress, Phase::Progress, Phase::Complete])
            .records(vec![json!({"email": "a@example.com"})]),
    ));
    let session = connector.new_session(&spec("any")).await.unwrap();
    let config = json!({});

    let query = Query {
        identifiers: vec![build_identifier(&users(), "email", "a@example.com")],
    };
    let (started, code) = session.query(&config, &query).await.unwrap().collect().await;
    assert_eq!(code, 0);
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].status.request_status, Phase::Progress);

    let requests = RequestsMessage {
        handles: vec![started[0].handle.clone()],
    };
    let (first, _) = session.request_status(&config, &requests).await.unwrap().collect().await;
    assert_eq!(first[0].request_status, Phase::Progress);

    let (second, _) = session.request_status(&config, &requests).await.unwrap().collect().await;
    assert_eq!(second[0].request_status, Phase::Complete);
    assert_eq!(second[0].data_type, Some(DataType::Records));

    let (records, _) = session
        .request_results(&config, &requests)
        .await
        .unwrap()
        .collect()
        .await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].record_type, RecordType::Record);

    session.teardown().await.unwrap();
    assert_eq!(connector.teardowns().await, 1);
    assert_eq!(
        connector
            .count_calls(|c| matches!(c, ConnectorCall::RequestStatus(_)))
            .await,
        2
    );
}

#[tokio::test]
async fn test_flaky_schema_recovers() {
    let connector = ScriptedConnector::new(Script::new().schema(users()).flaky_schema(1));
    let session = connector.new_session(&spec("any")).await.unwrap();

    assert!(session.schema(&json!({})).await.is_err());
    let catalog = session.schema(&json!({})).await.unwrap();
    assert_eq!(catalog.schemas.len(), 1);
}

#[tokio::test]
async fn test_factory_routes_by_image() {
    let pg = ScriptedConnector::new(Script::new().schema(users()));
    let factory = ScriptedFactory::new().register("pg", pg.clone());

    assert!(factory.new_session(&spec("pg")).await.is_ok());
    assert!(factory.new_session(&spec("mysql")).await.is_err());
    assert_eq!(pg.sessions_opened().await, 1);
}

#[tokio::test]
async fn test_delete_reports_no_payload() {
    let connector = ScriptedConnector::new(
        Script::new().entity(users(), EntityScript::complete().records(vec![json!({})])),
    );
    let session = connector.new_session(&spec("any")).await.unwrap();
    let query = Query {
        identifiers: vec![build_identifier(&users(), "email", "x")],
    };

    let (started, _) = session.delete(&json!({}), &query).await.unwrap().collect().await;
    assert_eq!(started[0].status.data_type, Some(DataType::None));
    assert_eq!(
        connector.calls().await,
        vec![ConnectorCall::Delete(vec![DataSourceMatcher::new("users", None)])]
    );
}
