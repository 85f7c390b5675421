//! Tests for the stdin worker.

use custodian::{
    JobStatus, MemoryLogStore, MemoryStore, RequestStatusType, WorkerCommand, WorkflowConfig,
    WorkflowContext, worker,
};
use custodian::{
    AdminStore, DataSourceBuilder, PrimaryKeyValue, PropertyBuilder, Request, RequestKind,
    RequestStatus, SiloDefinitionBuilder, SiloSpecificationBuilder, StatusStore,
};
use custodian_protocol::{EntityScript, Phase, Schema, Script, ScriptedConnector};
use std::sync::Arc;

async fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    let source = DataSourceBuilder::default()
        .id("ds-users")
        .name("users")
        .properties(vec![
            PropertyBuilder::default()
                .id("prop-email")
                .name("email")
                .user_primary_key_id(Some("pk-email".to_string()))
                .build()
                .expect("Valid property"),
        ])
        .build()
        .expect("Valid data source");
    let silo = SiloDefinitionBuilder::default()
        .id("silo-1")
        .workspace_id("ws-1")
        .name("warehouse")
        .specification(
            SiloSpecificationBuilder::default()
                .id("spec-1")
                .name("postgres")
                .image("connector-postgres")
                .build()
                .expect("Valid specification"),
        )
        .config("{}")
        .data_sources(vec![source])
        .build()
        .expect("Valid silo");
    store.put_silo_definition(silo).await.expect("Seed silo");
    store
        .put_request(Request {
            id: "req-1".into(),
            workspace_id: "ws-1".into(),
            kind: RequestKind::Query,
            primary_key_values: vec![PrimaryKeyValue {
                user_primary_key_id: "pk-email".into(),
                value: "ada@example.com".into(),
            }],
            job_id: None,
        })
        .await
        .expect("Seed request");
    store
        .put_request_status(RequestStatus::new("rs-users", "req-1", "ds-users"))
        .await
        .expect("Seed status");
    store
}

fn users_schema() -> Schema {
    Schema {
        name: "users".into(),
        group: None,
        json_schema: serde_json::json!({"properties": {"email": {"type": "string"}}}),
    }
}

fn engine(store: &MemoryStore, connector: ScriptedConnector) -> custodian::Engine {
    custodian::Engine::new(WorkflowContext::new(
        Arc::new(store.clone()),
        Arc::new(connector),
        Arc::new(MemoryLogStore::new()),
        WorkflowConfig::default(),
    ))
}

#[test]
fn test_commands_parse_from_json_lines() {
    let execute = WorkerCommand::parse(
        r#"{"type":"execute-request","requestId":"req-1","jobId":"job-1","workspaceId":"ws-1"}"#,
    )
    .expect("Execute command parses");
    assert_eq!(
        execute,
        WorkerCommand::ExecuteRequest(custodian::ExecuteRequestArgs::new("req-1", "job-1", "ws-1"))
    );

    let signal = WorkerCommand::parse(
        r#"{"type":"silo-update-status","requestStatusId":"rs-1","siloDefinitionId":"silo-1"}"#,
    )
    .expect("Signal parses");
    assert_eq!(
        signal,
        WorkerCommand::SiloUpdateStatus(custodian::SiloUpdateStatus::new("rs-1", "silo-1"))
    );

    assert!(WorkerCommand::parse(r#"{"type":"reboot"}"#).is_err());
    assert!(WorkerCommand::parse("not json").is_err());
}

#[tokio::test(start_paused = true)]
async fn test_worker_runs_jobs_and_routes_signals() {
    let store = seeded_store().await;
    let connector = ScriptedConnector::new(Script::new().entity(
        users_schema(),
        EntityScript::new(vec![Phase::Progress, Phase::Complete])
            .records(vec![serde_json::json!({"email": "ada@example.com"})]),
    ));

    let input = concat!(
        r#"{"type":"execute-request","requestId":"req-1","jobId":"job-1","workspaceId":"ws-1"}"#,
        "\n",
        "\n",
        "garbage\n",
        r#"{"type":"silo-update-status","requestStatusId":"rs-users","siloDefinitionId":"silo-1"}"#,
        "\n",
        r#"{"type":"discover-sources","siloDefinitionId":"silo-1","workspaceId":"ws-1","jobId":"job-2"}"#,
        "\n",
    );

    let summary = worker::run(engine(&store, connector), input.as_bytes())
        .await
        .expect("Worker drains input");

    assert_eq!(*summary.accepted(), 3);
    assert_eq!(*summary.rejected(), 1);
    assert_eq!(*summary.signals_routed(), 1);
    assert_eq!(*summary.jobs_succeeded(), 2);
    assert_eq!(*summary.jobs_failed(), 0);

    assert_eq!(
        *store.get_job("job-1").await.expect("Execution job").status(),
        JobStatus::Completed
    );
    assert_eq!(
        *store.get_job("job-2").await.expect("Discovery job").status(),
        JobStatus::Completed
    );
    assert_eq!(
        store
            .get_request_status("rs-users")
            .await
            .expect("Status exists")
            .status,
        RequestStatusType::Executed
    );
}

#[tokio::test]
async fn test_failed_jobs_are_counted() {
    let store = seeded_store().await;
    let input = concat!(
        r#"{"type":"discover-sources","siloDefinitionId":"silo-missing","workspaceId":"ws-1","jobId":"job-9"}"#,
        "\n",
    );

    let summary = worker::run(
        engine(&store, ScriptedConnector::new(Script::new())),
        input.as_bytes(),
    )
    .await
    .expect("Worker drains input");

    assert_eq!(*summary.accepted(), 1);
    assert_eq!(*summary.jobs_failed(), 1);
    assert_eq!(
        *store.get_job("job-9").await.expect("Discovery job").status(),
        JobStatus::Failed
    );
}
