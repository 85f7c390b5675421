//! Fixtures shared by the workflow tests.

#![allow(dead_code)]

use custodian_core::{
    DataSource, DataSourceBuilder, PrimaryKeyValue, PropertyBuilder, Request, RequestKind,
    RequestStatus, SiloDefinition, SiloDefinitionBuilder, SiloSpecificationBuilder,
};
use custodian_protocol::{ConnectorFactory, Schema};
use custodian_storage::{AdminStore, MemoryLogStore, MemoryStore};
use custodian_workflow::{
    CoordinatorArgs, CoordinatorMessage, RetryPolicyBuilder, SiloCoordinator, SiloReport,
    SiloUpdateStatus, StaleReason, WorkflowConfig, WorkflowContext,
};
use ractor::{Actor, ActorRef};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const WORKSPACE: &str = "ws-1";
pub const EMAIL_KEY: &str = "pk-email";
pub const EMAIL: &str = "ada@example.com";

/// Config with millisecond backoff so retry tests stay fast.
pub fn fast_config() -> WorkflowConfig {
    let retry = RetryPolicyBuilder::default()
        .max_attempts(3)
        .initial_backoff_ms(1)
        .max_delay_secs(1)
        .build()
        .expect("Valid retry policy");
    WorkflowConfig::builder()
        .orchestrator_retry(retry.clone())
        .coordinator_retry(retry)
        .build()
        .expect("Valid workflow config")
}

pub fn schema(name: &str, properties: &[&str]) -> Schema {
    let props: serde_json::Map<String, serde_json::Value> = properties
        .iter()
        .map(|p| (p.to_string(), serde_json::json!({ "type": "string" })))
        .collect();
    Schema {
        name: name.to_string(),
        group: None,
        json_schema: serde_json::json!({ "type": "object", "properties": props }),
    }
}

/// Data source whose `key_property` carries user primary key `key_id`.
pub fn keyed_source(id: &str, name: &str, key_property: &str, key_id: &str) -> DataSource {
    DataSourceBuilder::default()
        .id(id)
        .name(name)
        .properties(vec![
            PropertyBuilder::default()
                .id(format!("{}-{}", id, key_property))
                .name(key_property)
                .user_primary_key_id(Some(key_id.to_string()))
                .build()
                .expect("Valid property"),
        ])
        .build()
        .expect("Valid data source")
}

pub fn unkeyed_source(id: &str, name: &str) -> DataSource {
    DataSourceBuilder::default()
        .id(id)
        .name(name)
        .build()
        .expect("Valid data source")
}

pub fn silo(id: &str, image: &str, sources: Vec<DataSource>) -> SiloDefinition {
    build_silo(id, image, false, sources)
}

pub fn manual_silo(id: &str, sources: Vec<DataSource>) -> SiloDefinition {
    build_silo(id, "manual", true, sources)
}

fn build_silo(id: &str, image: &str, manual: bool, sources: Vec<DataSource>) -> SiloDefinition {
    SiloDefinitionBuilder::default()
        .id(id)
        .workspace_id(WORKSPACE)
        .name(id)
        .specification(
            SiloSpecificationBuilder::default()
                .id(format!("spec-{}", id))
                .name(image)
                .image(image)
                .manual(manual)
                .build()
                .expect("Valid specification"),
        )
        .config(r#"{"host":"localhost"}"#)
        .data_sources(sources)
        .build()
        .expect("Valid silo definition")
}

pub fn request(id: &str, kind: RequestKind) -> Request {
    Request {
        id: id.to_string(),
        workspace_id: WORKSPACE.to_string(),
        kind,
        primary_key_values: vec![PrimaryKeyValue {
            user_primary_key_id: EMAIL_KEY.to_string(),
            value: EMAIL.to_string(),
        }],
        job_id: None,
    }
}

/// Seed silos, a request and `(status id, data source id)` pairs.
pub async fn seed(
    store: &MemoryStore,
    silos: Vec<SiloDefinition>,
    request: &Request,
    statuses: &[(&str, &str)],
) {
    for silo in silos {
        store
            .put_silo_definition(silo)
            .await
            .expect("Seed silo definition");
    }
    store
        .put_request(request.clone())
        .await
        .expect("Seed request");
    for (id, data_source) in statuses {
        store
            .put_request_status(RequestStatus::new(*id, request.id.clone(), *data_source))
            .await
            .expect("Seed request status");
    }
}

pub fn context(
    store: &MemoryStore,
    connectors: impl ConnectorFactory + 'static,
) -> WorkflowContext {
    WorkflowContext::new(
        Arc::new(store.clone()),
        Arc::new(connectors),
        Arc::new(MemoryLogStore::new()),
        fast_config(),
    )
}

/// Stale signals observed by a recording hook.
pub type StaleLog = Arc<Mutex<Vec<(SiloUpdateStatus, StaleReason)>>>;

pub fn recording_hook(context: WorkflowContext) -> (WorkflowContext, StaleLog) {
    let log: StaleLog = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let context =
        context.with_stale_signal_hook(move |signal: &SiloUpdateStatus, reason: StaleReason| {
            sink.lock()
                .expect("Hook log lock")
                .push((signal.clone(), reason));
        });
    (context, log)
}

pub struct RunningCoordinator {
    pub actor: ActorRef<CoordinatorMessage>,
    pub join: JoinHandle<()>,
    pub reports: mpsc::UnboundedReceiver<SiloReport>,
}

impl RunningCoordinator {
    pub fn signal(&self, request_status_id: &str, silo_id: &str) {
        self.actor
            .send_message(CoordinatorMessage::Signal(SiloUpdateStatus::new(
                request_status_id,
                silo_id,
            )))
            .expect("Coordinator accepts signals");
    }

    pub async fn report(&mut self) -> SiloReport {
        self.reports.recv().await.expect("Coordinator reports")
    }

    pub async fn stop(self) {
        self.actor.stop(None);
        self.join.await.expect("Coordinator stops cleanly");
    }
}

/// Spawn a standalone coordinator reporting into a channel.
pub async fn spawn_coordinator(
    context: WorkflowContext,
    request: Request,
    silo: SiloDefinition,
) -> RunningCoordinator {
    let (tx, reports) = mpsc::unbounded_channel();
    let args = CoordinatorArgs {
        context,
        request,
        silo,
        log_object: None,
        report: Arc::new(move |report| {
            let _ = tx.send(report);
        }),
    };
    let (actor, join) = Actor::spawn(None, SiloCoordinator, args)
        .await
        .expect("Coordinator spawns");
    RunningCoordinator {
        actor,
        join,
        reports,
    }
}
