//! Tests for the in-memory and JSON file stores.

use chrono::Utc;
use custodian_core::{
    DataSourceBuilder, Job, JobKind, JobStatus, QueryResult, Request, RequestKind,
    RequestStatus, RequestStatusType, SecretString, SiloDefinition, SiloDefinitionBuilder,
    SiloSpecificationBuilder,
};
use custodian_storage::{AdminStore, JsonFileStore, MemoryStore, StatusStore};
use tempfile::TempDir;

fn silo(id: &str, data_sources: &[&str]) -> SiloDefinition {
    SiloDefinitionBuilder::default()
        .id(id)
        .workspace_id("ws")
        .name(id)
        .specification(
            SiloSpecificationBuilder::default()
                .id("spec")
                .name("spec")
                .image("img")
                .build()
                .unwrap(),
        )
        .data_sources(
            data_sources
                .iter()
                .map(|ds| {
                    DataSourceBuilder::default()
                        .id(*ds)
                        .name(*ds)
                        .build()
                        .unwrap()
                })
                .collect::<Vec<_>>(),
        )
        .build()
        .unwrap()
}

async fn seed<S: AdminStore>(store: &S) {
    store.put_silo_definition(silo("s1", &["ds1", "ds2"])).await.unwrap();
    store.put_silo_definition(silo("s2", &["ds3"])).await.unwrap();
    store
        .put_request(Request {
            id: "r1".into(),
            workspace_id: "ws".into(),
            kind: RequestKind::Query,
            primary_key_values: vec![],
            job_id: None,
        })
        .await
        .unwrap();
    for (id, ds) in [("rs1", "ds1"), ("rs2", "ds2"), ("rs3", "ds3")] {
        store
            .put_request_status(RequestStatus::new(id, "r1", ds))
            .await
            .unwrap();
    }
}

fn job(id: &str) -> Job {
    Job::new(id, "ws", JobKind::ExecuteRequest, "r1", JobStatus::Running, Utc::now())
}

#[tokio::test]
async fn test_find_or_create_job_is_idempotent() {
    let store = MemoryStore::new();
    let first = store.find_or_create_job(job("j1")).await.unwrap();
    let second = store
        .find_or_create_job(Job::new(
            "j1",
            "ws",
            JobKind::ExecuteRequest,
            "r1",
            JobStatus::Queued,
            Utc::now(),
        ))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(*second.status(), JobStatus::Running);
}

#[tokio::test]
async fn test_update_job_status_twice_leaves_same_state() {
    let store = MemoryStore::new();
    store.find_or_create_job(job("j1")).await.unwrap();

    let once = store.update_job_status("j1", JobStatus::Completed).await.unwrap();
    let twice = store.update_job_status("j1", JobStatus::Completed).await.unwrap();

    assert_eq!(once, twice);
    assert_eq!(
        store.job_history("j1").await,
        vec![JobStatus::Running, JobStatus::Completed]
    );
}

#[tokio::test]
async fn test_statuses_filtered_by_silo() {
    let store = MemoryStore::new();
    seed(&store).await;

    let s1: Vec<_> = store
        .request_statuses_for_silo("r1", "s1")
        .await
        .unwrap()
        .into_iter()
        .map(|rs| rs.id)
        .collect();
    assert_eq!(s1, vec!["rs1".to_string(), "rs2".to_string()]);
    assert_eq!(store.request_statuses("r1").await.unwrap().len(), 3);
    assert!(store.request_statuses_for_silo("r1", "missing").await.is_err());
}

#[tokio::test]
async fn test_update_request_status_keeps_handle() {
    let store = MemoryStore::new();
    seed(&store).await;

    store
        .update_request_status(
            "rs1",
            RequestStatusType::InProgress,
            Some(SecretString::new("{\"h\":1}")),
        )
        .await
        .unwrap();
    let updated = store
        .update_request_status("rs1", RequestStatusType::Executed, None)
        .await
        .unwrap();
    store
        .update_request_status("rs1", RequestStatusType::Executed, None)
        .await
        .unwrap();

    assert_eq!(updated.handle.unwrap().expose(), "{\"h\":1}");
    assert_eq!(
        store.status_history("rs1").await,
        vec![RequestStatusType::InProgress, RequestStatusType::Executed]
    );
}

#[tokio::test]
async fn test_query_result_links_to_status() {
    let store = MemoryStore::new();
    seed(&store).await;

    let result = QueryResult::records("q1", "rs1", &[serde_json::json!({"a": 1})]);
    store.create_query_result(result.clone()).await.unwrap();
    store.create_query_result(result.clone()).await.unwrap();

    assert_eq!(store.query_result("rs1").await.unwrap(), Some(result));
    assert_eq!(
        store.get_request_status("rs1").await.unwrap().query_result_id,
        Some("q1".to_string())
    );
    assert_eq!(store.query_result("rs2").await.unwrap(), None);
}

#[tokio::test]
async fn test_injected_outage_is_retryable() {
    let store = MemoryStore::new();
    seed(&store).await;
    store.fail_next_writes(1);

    let err = store
        .update_request_status("rs1", RequestStatusType::Failed, None)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(
        store
            .update_request_status("rs1", RequestStatusType::Failed, None)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_json_file_store_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("state").join("store.json");

    {
        let store = JsonFileStore::open(&path).await.unwrap();
        seed(&store).await;
        store.find_or_create_job(job("j1")).await.unwrap();
        store
            .update_request_status("rs2", RequestStatusType::Executed, None)
            .await
            .unwrap();
        store.link_request_job("r1", "j1").await.unwrap();
    }

    let reopened = JsonFileStore::open(&path).await.unwrap();
    assert_eq!(
        reopened.get_request_status("rs2").await.unwrap().status,
        RequestStatusType::Executed
    );
    assert_eq!(
        reopened.get_request("r1").await.unwrap().job_id,
        Some("j1".to_string())
    );
    assert_eq!(reopened.silo_definitions("ws").await.unwrap().len(), 2);
    assert!(!path.with_extension("tmp").exists());
}

#[tokio::test]
async fn test_json_file_store_rejects_corrupt_snapshot() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("store.json");
    std::fs::write(&path, b"{not json").unwrap();

    assert!(JsonFileStore::open(&path).await.is_err());
}
