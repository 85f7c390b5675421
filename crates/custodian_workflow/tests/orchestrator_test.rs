//! End-to-end tests of request orchestration through the engine.

mod test_utils;

use async_trait::async_trait;
use custodian_core::{
    DataDiscovery, Job, JobStatus, QueryResult, Request, RequestKind, RequestStatus,
    RequestStatusType, SecretString, SiloDefinition,
};
use custodian_error::{
    ConnectorErrorKind, CustodianErrorKind, CustodianResult, StoreError, StoreErrorKind,
    WorkflowErrorKind,
};
use custodian_protocol::{EntityScript, Phase, Script, ScriptedConnector, ScriptedFactory};
use custodian_storage::{AdminStore, MemoryLogStore, MemoryStore, StatusStore};
use custodian_workflow::{
    Engine, ExecuteRequestArgs, SiloUpdateStatus, StaleReason, WorkflowContext,
};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use test_utils::*;

fn execution() -> ExecuteRequestArgs {
    ExecuteRequestArgs::new("req-1", "job-1", WORKSPACE)
}

async fn status_of(store: &MemoryStore, id: &str) -> RequestStatusType {
    store
        .get_request_status(id)
        .await
        .expect("Status exists")
        .status
}

/// Poll until `check` holds, yielding to the actors in between.
async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..400 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("Condition never held");
}

fn completing(name: &str) -> ScriptedConnector {
    ScriptedConnector::new(Script::new().entity(
        schema(name, &["email"]),
        EntityScript::complete().records(vec![json!({"email": EMAIL})]),
    ))
}

#[tokio::test]
async fn test_completed_request_updates_job_and_links_request() {
    let store = MemoryStore::new();
    let request = request("req-1", RequestKind::Query);
    let crm = silo(
        "silo-crm",
        "crm",
        vec![keyed_source("ds-contacts", "contacts", "email", EMAIL_KEY)],
    );
    let billing = silo(
        "silo-billing",
        "billing",
        vec![keyed_source("ds-invoices", "invoices", "email", EMAIL_KEY)],
    );
    seed(
        &store,
        vec![crm, billing],
        &request,
        &[("rs-contacts", "ds-contacts"), ("rs-invoices", "ds-invoices")],
    )
    .await;

    let crm_connector = completing("contacts");
    let billing_connector = completing("invoices");
    let factory = ScriptedFactory::new()
        .register("crm", crm_connector.clone())
        .register("billing", billing_connector.clone());
    let engine = Engine::new(context(&store, factory));

    let status = engine
        .execute_request(execution())
        .await
        .expect("Orchestration succeeds");

    assert_eq!(status, JobStatus::Completed);
    assert_eq!(
        store.job_history("job-1").await,
        vec![JobStatus::Running, JobStatus::Completed]
    );
    assert_eq!(
        store.get_request("req-1").await.expect("Request exists").job_id,
        Some("job-1".to_string())
    );
    assert_eq!(status_of(&store, "rs-contacts").await, RequestStatusType::Executed);
    assert_eq!(status_of(&store, "rs-invoices").await, RequestStatusType::Executed);
    assert_eq!(crm_connector.teardowns().await, 1);
    assert_eq!(billing_connector.teardowns().await, 1);

    let job = store.get_job("job-1").await.expect("Job exists");
    assert!(job.log_object().is_some());
}

#[tokio::test]
async fn test_failing_only_silo_fails_job() {
    let store = MemoryStore::new();
    let request = request("req-1", RequestKind::Query);
    let broken = silo(
        "silo-broken",
        "broken",
        vec![keyed_source("ds-users", "users", "email", EMAIL_KEY)],
    );
    seed(&store, vec![broken], &request, &[("rs-users", "ds-users")]).await;

    let connector = ScriptedConnector::new(
        Script::new().fail_init(ConnectorErrorKind::Protocol("handshake refused".into())),
    );
    let engine = Engine::new(context(&store, ScriptedFactory::new().register("broken", connector)));

    let status = engine
        .execute_request(execution())
        .await
        .expect("Orchestration resolves");

    assert_eq!(status, JobStatus::Failed);
    assert_eq!(status_of(&store, "rs-users").await, RequestStatusType::Failed);
    assert_eq!(
        store.job_history("job-1").await,
        vec![JobStatus::Running, JobStatus::Failed]
    );
}

#[tokio::test]
async fn test_failing_silo_with_healthy_sibling_is_partial() {
    let store = MemoryStore::new();
    let request = request("req-1", RequestKind::Query);
    let broken = silo(
        "silo-broken",
        "broken",
        vec![keyed_source("ds-users", "users", "email", EMAIL_KEY)],
    );
    let healthy = silo(
        "silo-healthy",
        "healthy",
        vec![keyed_source("ds-orders", "orders", "email", EMAIL_KEY)],
    );
    seed(
        &store,
        vec![broken, healthy],
        &request,
        &[("rs-users", "ds-users"), ("rs-orders", "ds-orders")],
    )
    .await;

    let factory = ScriptedFactory::new()
        .register(
            "broken",
            ScriptedConnector::new(
                Script::new().fail_init(ConnectorErrorKind::Protocol("handshake refused".into())),
            ),
        )
        .register("healthy", completing("orders"));
    let engine = Engine::new(context(&store, factory));

    let status = engine
        .execute_request(execution())
        .await
        .expect("Orchestration resolves");

    assert_eq!(status, JobStatus::PartialFailed);
    assert_eq!(status_of(&store, "rs-users").await, RequestStatusType::Failed);
    assert_eq!(status_of(&store, "rs-orders").await, RequestStatusType::Executed);
}

#[tokio::test]
async fn test_failed_start_after_keyless_items_settle_is_partial() {
    let store = MemoryStore::new();
    let request = request("req-1", RequestKind::Query);
    let warehouse = silo(
        "silo-warehouse",
        "warehouse",
        vec![
            keyed_source("ds-users", "users", "email", EMAIL_KEY),
            unkeyed_source("ds-audit", "audit"),
        ],
    );
    seed(
        &store,
        vec![warehouse],
        &request,
        &[("rs-users", "ds-users"), ("rs-audit", "ds-audit")],
    )
    .await;

    let connector = ScriptedConnector::new(
        Script::new()
            .entity(schema("users", &["email"]), EntityScript::complete())
            .start_exit_code(2),
    );
    let engine = Engine::new(context(
        &store,
        ScriptedFactory::new().register("warehouse", connector),
    ));

    let status = engine
        .execute_request(execution())
        .await
        .expect("Orchestration resolves");

    assert_eq!(status, JobStatus::PartialFailed);
    assert_eq!(status_of(&store, "rs-users").await, RequestStatusType::Failed);
    assert_eq!(status_of(&store, "rs-audit").await, RequestStatusType::Executed);
    assert_eq!(
        store.job_history("job-1").await,
        vec![JobStatus::Running, JobStatus::PartialFailed]
    );
}

#[tokio::test]
async fn test_unregistered_image_fails_its_silo() {
    let store = MemoryStore::new();
    let request = request("req-1", RequestKind::Delete);
    let unknown = silo(
        "silo-unknown",
        "unknown-image",
        vec![keyed_source("ds-users", "users", "email", EMAIL_KEY)],
    );
    seed(&store, vec![unknown], &request, &[("rs-users", "ds-users")]).await;

    let engine = Engine::new(context(&store, ScriptedFactory::new()));
    let status = engine
        .execute_request(execution())
        .await
        .expect("Orchestration resolves");

    assert_eq!(status, JobStatus::Failed);
    assert_eq!(status_of(&store, "rs-users").await, RequestStatusType::Failed);
}

#[tokio::test]
async fn test_signals_are_routed_or_reported_stale() {
    let store = MemoryStore::new();
    let request = request("req-1", RequestKind::Query);
    let crm = silo(
        "silo-crm",
        "crm",
        vec![
            keyed_source("ds-contacts", "contacts", "email", EMAIL_KEY),
            keyed_source("ds-notes", "notes", "email", EMAIL_KEY),
        ],
    );
    seed(&store, vec![crm], &request, &[("rs-contacts", "ds-contacts")]).await;
    let mut done = RequestStatus::new("rs-notes", "req-1", "ds-notes");
    done.status = RequestStatusType::Executed;
    store.put_request_status(done).await.expect("Seed executed status");

    let connector = ScriptedConnector::new(
        Script::new()
            .entity(
                schema("contacts", &["email"]),
                EntityScript::new(vec![Phase::Progress, Phase::Complete])
                    .records(vec![json!({"email": EMAIL})]),
            )
            .entity(schema("notes", &["email"]), EntityScript::complete()),
    );
    let (context, stale) = recording_hook(context(
        &store,
        ScriptedFactory::new().register("crm", connector.clone()),
    ));
    let engine = Engine::new(context);

    let handle = engine
        .start_request(execution())
        .await
        .expect("Orchestration starts");
    assert_eq!(handle.job_id(), "job-1");
    assert!(engine.is_running("req-1").await);

    let store_ref = &store;
    eventually(|| async move {
        status_of(store_ref, "rs-contacts").await == RequestStatusType::InProgress
    })
    .await;

    let routed = engine
        .signal(SiloUpdateStatus::new("rs-notes", "silo-crm"))
        .await
        .expect("Signal lookup succeeds");
    assert!(routed);
    handle
        .signal(SiloUpdateStatus::new("rs-contacts", "silo-elsewhere"))
        .expect("Orchestration accepts signals");

    let stale_ref = &stale;
    eventually(|| async move { stale_ref.lock().expect("Hook log lock").len() == 2 }).await;
    {
        let stale = stale.lock().expect("Hook log lock");
        assert!(stale.contains(&(
            SiloUpdateStatus::new("rs-notes", "silo-crm"),
            StaleReason::NotPending
        )));
        assert!(stale.contains(&(
            SiloUpdateStatus::new("rs-contacts", "silo-elsewhere"),
            StaleReason::UnknownSilo
        )));
    }

    let routed = engine
        .signal(SiloUpdateStatus::new("rs-contacts", "silo-crm"))
        .await
        .expect("Signal lookup succeeds");
    assert!(routed);

    let status = handle.wait().await.expect("Orchestration resolves");
    assert_eq!(status, JobStatus::Completed);
    assert_eq!(status_of(&store, "rs-contacts").await, RequestStatusType::Executed);

    let engine_ref = &engine;
    eventually(|| async move { !engine_ref.is_running("req-1").await }).await;
    let routed = engine
        .signal(SiloUpdateStatus::new("rs-contacts", "silo-crm"))
        .await
        .expect("Signal lookup succeeds");
    assert!(!routed);
    assert_eq!(
        stale.lock().expect("Hook log lock").last(),
        Some(&(
            SiloUpdateStatus::new("rs-contacts", "silo-crm"),
            StaleReason::NotRunning
        ))
    );
}

#[tokio::test]
async fn test_signal_for_unknown_status_is_dropped() {
    let store = MemoryStore::new();
    let (context, stale) = recording_hook(context(&store, ScriptedFactory::new()));
    let engine = Engine::new(context);

    let routed = engine
        .signal(SiloUpdateStatus::new("rs-missing", "silo-1"))
        .await
        .expect("Unknown statuses are not an error");
    assert!(!routed);
    assert_eq!(
        stale.lock().expect("Hook log lock").as_slice(),
        &[(
            SiloUpdateStatus::new("rs-missing", "silo-1"),
            StaleReason::UnknownStatus
        )]
    );
}

#[tokio::test]
async fn test_terminal_statuses_need_no_connector() {
    let store = MemoryStore::new();
    let request = request("req-1", RequestKind::Query);
    let crm = silo(
        "silo-crm",
        "crm",
        vec![keyed_source("ds-contacts", "contacts", "email", EMAIL_KEY)],
    );
    seed(&store, vec![crm], &request, &[]).await;
    let mut done = RequestStatus::new("rs-contacts", "req-1", "ds-contacts");
    done.status = RequestStatusType::Executed;
    store.put_request_status(done).await.expect("Seed executed status");

    let connector = completing("contacts");
    let engine = Engine::new(context(
        &store,
        ScriptedFactory::new().register("crm", connector.clone()),
    ));

    let status = engine
        .execute_request(execution())
        .await
        .expect("Orchestration resolves");

    assert_eq!(status, JobStatus::Completed);
    assert_eq!(connector.sessions_opened().await, 0);
}

#[tokio::test]
async fn test_workspace_without_silos_completes() {
    let store = MemoryStore::new();
    seed(&store, vec![], &request("req-1", RequestKind::Query), &[]).await;
    let engine = Engine::new(context(&store, ScriptedFactory::new()));

    let status = engine
        .execute_request(execution())
        .await
        .expect("Orchestration resolves");

    assert_eq!(status, JobStatus::Completed);
    assert_eq!(
        store.job_history("job-1").await,
        vec![JobStatus::Running, JobStatus::Completed]
    );
}

#[tokio::test]
async fn test_orphaned_statuses_are_swept_failed() {
    let store = MemoryStore::new();
    let request = request("req-1", RequestKind::Query);
    let crm = silo(
        "silo-crm",
        "crm",
        vec![keyed_source("ds-contacts", "contacts", "email", EMAIL_KEY)],
    );
    seed(
        &store,
        vec![crm],
        &request,
        &[("rs-contacts", "ds-contacts"), ("rs-orphan", "ds-deleted")],
    )
    .await;

    let engine = Engine::new(context(
        &store,
        ScriptedFactory::new().register("crm", completing("contacts")),
    ));

    let status = engine
        .execute_request(execution())
        .await
        .expect("Orchestration resolves");

    assert_eq!(status, JobStatus::PartialFailed);
    assert_eq!(status_of(&store, "rs-contacts").await, RequestStatusType::Executed);
    assert_eq!(status_of(&store, "rs-orphan").await, RequestStatusType::Failed);
}

#[tokio::test]
async fn test_workspace_mismatch_fails_job() {
    let store = MemoryStore::new();
    seed(&store, vec![], &request("req-1", RequestKind::Query), &[]).await;
    let engine = Engine::new(context(&store, ScriptedFactory::new()));

    let result = engine
        .execute_request(ExecuteRequestArgs::new("req-1", "job-1", "ws-other"))
        .await;

    assert!(result.is_err());
    assert_eq!(
        *store.get_job("job-1").await.expect("Job exists").status(),
        JobStatus::Failed
    );
}

#[tokio::test]
async fn test_rerun_reuses_existing_job() {
    let store = MemoryStore::new();
    let request = request("req-1", RequestKind::Query);
    let crm = silo(
        "silo-crm",
        "crm",
        vec![keyed_source("ds-contacts", "contacts", "email", EMAIL_KEY)],
    );
    seed(&store, vec![crm], &request, &[("rs-contacts", "ds-contacts")]).await;

    let connector = completing("contacts");
    let engine = Engine::new(context(
        &store,
        ScriptedFactory::new().register("crm", connector.clone()),
    ));

    engine
        .execute_request(execution())
        .await
        .expect("First run resolves");
    let first = store.get_job("job-1").await.expect("Job exists");
    let status = engine
        .execute_request(execution())
        .await
        .expect("Second run resolves");

    assert_eq!(status, JobStatus::Completed);
    let second = store.get_job("job-1").await.expect("Job exists");
    assert_eq!(first.correlation_id(), second.correlation_id());
    assert_eq!(
        store.job_history("job-1").await,
        vec![
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Running,
            JobStatus::Completed
        ]
    );
    // Everything was already executed the second time round.
    assert_eq!(connector.sessions_opened().await, 1);
}

/// Forwards to a [`MemoryStore`], failing the calls it was told to fail.
struct FaultyStore {
    inner: MemoryStore,
    panic_on_next_statuses: AtomicBool,
    fail_statuses: bool,
    fail_final_job_write: bool,
}

impl FaultyStore {
    fn new(inner: &MemoryStore) -> Self {
        Self {
            inner: inner.clone(),
            panic_on_next_statuses: AtomicBool::new(false),
            fail_statuses: false,
            fail_final_job_write: false,
        }
    }

    fn panicking_once(self) -> Self {
        self.panic_on_next_statuses.store(true, Ordering::SeqCst);
        self
    }

    fn failing_closure(mut self) -> Self {
        self.fail_statuses = true;
        self.fail_final_job_write = true;
        self
    }
}

#[async_trait]
impl StatusStore for FaultyStore {
    async fn find_or_create_job(&self, job: Job) -> CustodianResult<Job> {
        self.inner.find_or_create_job(job).await
    }

    async fn get_job(&self, id: &str) -> CustodianResult<Job> {
        self.inner.get_job(id).await
    }

    async fn update_job_status(&self, id: &str, status: JobStatus) -> CustodianResult<Job> {
        if self.fail_final_job_write && status != JobStatus::Running {
            let reason = format!("job {} is locked", id);
            return Err(StoreError::new(StoreErrorKind::Conflict(reason)).into());
        }
        self.inner.update_job_status(id, status).await
    }

    async fn get_request(&self, id: &str) -> CustodianResult<Request> {
        self.inner.get_request(id).await
    }

    async fn link_request_job(&self, request_id: &str, job_id: &str) -> CustodianResult<()> {
        self.inner.link_request_job(request_id, job_id).await
    }

    async fn request_statuses(&self, request_id: &str) -> CustodianResult<Vec<RequestStatus>> {
        if self.panic_on_next_statuses.swap(false, Ordering::SeqCst) {
            panic!("status listing crashed");
        }
        if self.fail_statuses {
            let reason = "listing disabled".to_string();
            return Err(StoreError::new(StoreErrorKind::Conflict(reason)).into());
        }
        self.inner.request_statuses(request_id).await
    }

    async fn request_statuses_for_silo(
        &self,
        request_id: &str,
        silo_definition_id: &str,
    ) -> CustodianResult<Vec<RequestStatus>> {
        self.inner
            .request_statuses_for_silo(request_id, silo_definition_id)
            .await
    }

    async fn get_request_status(&self, id: &str) -> CustodianResult<RequestStatus> {
        self.inner.get_request_status(id).await
    }

    async fn update_request_status(
        &self,
        id: &str,
        status: RequestStatusType,
        handle: Option<SecretString>,
    ) -> CustodianResult<RequestStatus> {
        self.inner.update_request_status(id, status, handle).await
    }

    async fn create_query_result(&self, result: QueryResult) -> CustodianResult<QueryResult> {
        self.inner.create_query_result(result).await
    }

    async fn query_result(&self, request_status_id: &str) -> CustodianResult<Option<QueryResult>> {
        self.inner.query_result(request_status_id).await
    }

    async fn silo_definitions(&self, workspace_id: &str) -> CustodianResult<Vec<SiloDefinition>> {
        self.inner.silo_definitions(workspace_id).await
    }

    async fn get_silo_definition(&self, id: &str) -> CustodianResult<SiloDefinition> {
        self.inner.get_silo_definition(id).await
    }

    async fn discoveries(&self, silo_definition_id: &str) -> CustodianResult<Vec<DataDiscovery>> {
        self.inner.discoveries(silo_definition_id).await
    }

    async fn upsert_discovery(&self, discovery: DataDiscovery) -> CustodianResult<DataDiscovery> {
        self.inner.upsert_discovery(discovery).await
    }
}

fn faulty_context(store: FaultyStore, connectors: ScriptedFactory) -> WorkflowContext {
    WorkflowContext::new(
        Arc::new(store),
        Arc::new(connectors),
        Arc::new(MemoryLogStore::new()),
        fast_config(),
    )
}

async fn seed_broken_and_healthy(store: &MemoryStore) -> ScriptedFactory {
    let request = request("req-1", RequestKind::Query);
    let broken = silo(
        "silo-broken",
        "broken",
        vec![keyed_source("ds-users", "users", "email", EMAIL_KEY)],
    );
    let healthy = silo(
        "silo-healthy",
        "healthy",
        vec![keyed_source("ds-orders", "orders", "email", EMAIL_KEY)],
    );
    seed(
        store,
        vec![broken, healthy],
        &request,
        &[("rs-users", "ds-users"), ("rs-orders", "ds-orders")],
    )
    .await;

    ScriptedFactory::new()
        .register(
            "broken",
            ScriptedConnector::new(
                Script::new().fail_init(ConnectorErrorKind::Protocol("handshake refused".into())),
            ),
        )
        .register("healthy", completing("orders"))
}

#[tokio::test]
async fn test_cancelled_orchestration_closes_job_and_tears_down() {
    let store = MemoryStore::new();
    let request = request("req-1", RequestKind::Query);
    let crm = silo(
        "silo-crm",
        "crm",
        vec![keyed_source("ds-contacts", "contacts", "email", EMAIL_KEY)],
    );
    seed(&store, vec![crm], &request, &[("rs-contacts", "ds-contacts")]).await;

    let connector = ScriptedConnector::new(Script::new().entity(
        schema("contacts", &["email"]),
        EntityScript::new(vec![Phase::Progress]),
    ));
    let engine = Engine::new(context(
        &store,
        ScriptedFactory::new().register("crm", connector.clone()),
    ));

    let handle = engine
        .start_request(execution())
        .await
        .expect("Orchestration starts");
    let store_ref = &store;
    eventually(|| async move {
        status_of(store_ref, "rs-contacts").await == RequestStatusType::InProgress
    })
    .await;

    handle.cancel();
    let status = handle.wait().await.expect("Cancelled orchestration settles");

    assert_eq!(status, JobStatus::Failed);
    assert_eq!(status_of(&store, "rs-contacts").await, RequestStatusType::Failed);
    assert_eq!(
        store.job_history("job-1").await,
        vec![JobStatus::Running, JobStatus::Failed]
    );
    assert_eq!(connector.teardowns().await, 1);
}

#[tokio::test]
async fn test_orchestrator_crash_while_finishing_still_closes_job() {
    let store = MemoryStore::new();
    let factory = seed_broken_and_healthy(&store).await;
    let engine = Engine::new(faulty_context(
        FaultyStore::new(&store).panicking_once(),
        factory,
    ));

    let err = engine
        .execute_request(execution())
        .await
        .expect_err("A crashed orchestration reports its lost outcome");

    assert!(matches!(
        err.kind(),
        CustodianErrorKind::Workflow(e) if matches!(e.kind, WorkflowErrorKind::OutcomeLost(_))
    ));
    assert_eq!(status_of(&store, "rs-users").await, RequestStatusType::Failed);
    assert_eq!(status_of(&store, "rs-orders").await, RequestStatusType::Executed);
    assert_eq!(
        store.job_history("job-1").await,
        vec![JobStatus::Running, JobStatus::PartialFailed]
    );
}

#[tokio::test]
async fn test_failures_while_closing_job_are_reported_together() {
    let store = MemoryStore::new();
    let request = request("req-1", RequestKind::Query);
    let crm = silo(
        "silo-crm",
        "crm",
        vec![keyed_source("ds-contacts", "contacts", "email", EMAIL_KEY)],
    );
    seed(&store, vec![crm], &request, &[("rs-contacts", "ds-contacts")]).await;
    let engine = Engine::new(faulty_context(
        FaultyStore::new(&store).failing_closure(),
        ScriptedFactory::new().register("crm", completing("contacts")),
    ));

    let err = engine
        .execute_request(execution())
        .await
        .expect_err("Closing the job fails");

    let CustodianErrorKind::Aggregate(aggregate) = err.kind() else {
        panic!("Expected an aggregate error, got {}", err);
    };
    assert_eq!(aggregate.len(), 2);
    assert!(aggregate.causes[0].to_string().contains("listing disabled"));
    assert!(aggregate.causes[1].to_string().contains("job job-1 is locked"));
    assert_eq!(status_of(&store, "rs-contacts").await, RequestStatusType::Executed);
    assert_eq!(store.job_history("job-1").await, vec![JobStatus::Running]);
}
