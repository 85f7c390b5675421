//! Discovery job: diff a silo's connector catalog against its known data
//! sources and keep the open discoveries in step.

use crate::{
    DiscoverSourcesArgs, JobTracker, RetryPolicy, WorkflowContext, activity, connector_logs,
};
use chrono::Utc;
use custodian_core::{
    DataDiscovery, DiscoveryData, DiscoveryKey, DiscoveryStatus, Job, JobKind, JobStatus,
    SiloDefinition,
};
use custodian_error::{
    ConnectorError, ConnectorErrorKind, CustodianResult, WorkflowError, WorkflowErrorKind,
};
use custodian_protocol::{ConnectorSession, DataSourceMatcher, SchemasMessage, index_schemas};
use custodian_storage::StatusStore;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Changes between a connector catalog and a silo's data sources.
///
/// Schemas and data sources are matched by name and group. Matched pairs
/// are compared property by property.
///
/// # Examples
///
/// ```
/// use custodian_core::{DiscoveryData, SiloDefinitionBuilder, SiloSpecificationBuilder};
/// use custodian_protocol::{Schema, SchemasMessage};
/// use custodian_workflow::diff_catalog;
///
/// let silo = SiloDefinitionBuilder::default()
///     .id("silo-1")
///     .workspace_id("ws-1")
///     .name("warehouse")
///     .specification(
///         SiloSpecificationBuilder::default()
///             .id("spec-1")
///             .name("postgres")
///             .image("connector-postgres")
///             .build()
///             .unwrap(),
///     )
///     .build()
///     .unwrap();
/// let catalog = SchemasMessage {
///     schemas: vec![Schema {
///         name: "users".into(),
///         group: None,
///         json_schema: serde_json::json!({"properties": {"email": {}}}),
///     }],
/// };
///
/// let changes = diff_catalog(&silo, &catalog);
/// assert_eq!(
///     changes,
///     vec![DiscoveryData::DataSourceFound {
///         name: "users".into(),
///         group: None,
///         properties: vec!["email".into()],
///     }]
/// );
/// ```
pub fn diff_catalog(silo: &SiloDefinition, catalog: &SchemasMessage) -> Vec<DiscoveryData> {
    let schemas = index_schemas(catalog);
    let known: HashSet<DataSourceMatcher> = silo
        .data_sources()
        .iter()
        .map(DataSourceMatcher::from)
        .collect();

    let mut changes: Vec<DiscoveryData> = catalog
        .schemas
        .iter()
        .filter(|schema| !known.contains(&DataSourceMatcher::from(*schema)))
        .map(|schema| DiscoveryData::DataSourceFound {
            name: schema.name.clone(),
            group: schema.group.clone(),
            properties: schema.property_names(),
        })
        .collect();

    for data_source in silo.data_sources() {
        let Some(schema) = schemas.get(&DataSourceMatcher::from(data_source)) else {
            changes.push(DiscoveryData::DataSourceMissing {
                id: data_source.id().clone(),
            });
            continue;
        };

        let reported = schema.property_names();
        for name in &reported {
            if !data_source.properties().iter().any(|p| p.name() == name) {
                changes.push(DiscoveryData::PropertyFound {
                    name: name.clone(),
                    data_source_id: data_source.id().clone(),
                });
            }
        }
        for property in data_source.properties() {
            if !reported.contains(property.name()) {
                changes.push(DiscoveryData::PropertyMissing {
                    id: property.id().clone(),
                });
            }
        }
    }
    changes
}

/// Run one discovery job. The Job ends `Completed` or `Failed` on every
/// path once it has been opened.
#[instrument(skip(context), fields(silo_id = %args.silo_definition_id, job_id = %args.job_id))]
pub(crate) async fn discover_sources(
    context: &WorkflowContext,
    args: DiscoverSourcesArgs,
) -> CustodianResult<usize> {
    let tracker = JobTracker::new(context);
    let job = tracker
        .find_or_create_job(
            &args.job_id,
            &args.workspace_id,
            JobKind::DiscoverSources,
            &args.silo_definition_id,
            JobStatus::Running,
        )
        .await?;

    let outcome = scan(context, &job, &args).await;
    let status = match &outcome {
        Ok(created) => {
            info!(created, "Discovery finished");
            JobStatus::Completed
        }
        Err(e) => {
            error!(error = %e, "Discovery failed");
            JobStatus::Failed
        }
    };
    let written = tracker.update_job_status(&args.job_id, status).await;

    let created = outcome?;
    written?;
    Ok(created)
}

async fn scan(
    context: &WorkflowContext,
    job: &Job,
    args: &DiscoverSourcesArgs,
) -> CustodianResult<usize> {
    let policy = context.config().coordinator_retry();
    let store = context.store().clone();

    let silo = activity::execute(policy, "get_silo_definition", || {
        store.get_silo_definition(&args.silo_definition_id)
    })
    .await?;
    if *silo.workspace_id() != args.workspace_id {
        return Err(WorkflowError::new(WorkflowErrorKind::InvalidInput(format!(
            "silo {} belongs to workspace {}, not {}",
            silo.id(),
            silo.workspace_id(),
            args.workspace_id
        )))
        .into());
    }
    if *silo.specification().manual() {
        return Err(WorkflowError::new(WorkflowErrorKind::InvalidInput(format!(
            "silo {} has no connector to scan",
            silo.id()
        )))
        .into());
    }

    let connectors = context.connectors().clone();
    let session = activity::execute(policy, "new_session", || {
        connectors.new_session(silo.specification())
    })
    .await?;

    let forwarder = match session.attach_logs().await {
        Ok(stream) => Some(connector_logs::forward(
            stream,
            context.logs().clone(),
            job.log_object().clone(),
            silo.id().clone(),
        )),
        Err(e) => {
            warn!(error = %e, "Failed to attach connector logs");
            None
        }
    };

    let catalog = fetch_catalog(policy, &session, &silo).await;

    if let Err(e) = session.teardown().await {
        warn!(error = %e, "Connector teardown failed");
    }
    if let Some(task) = forwarder {
        connector_logs::drain(task).await;
    }

    let catalog = catalog?;
    let changes = diff_catalog(&silo, &catalog);
    debug!(changes = changes.len(), "Diffed schema catalog");
    reconcile(&store, policy, silo.id(), changes).await
}

async fn fetch_catalog(
    policy: &RetryPolicy,
    session: &Arc<dyn ConnectorSession>,
    silo: &SiloDefinition,
) -> CustodianResult<SchemasMessage> {
    activity::execute(policy, "init_conn", || session.init_conn()).await?;
    let config = silo
        .config_json()
        .map_err(|e| ConnectorError::new(ConnectorErrorKind::InvalidConfig(e.to_string())))?;
    let config = &config;
    activity::execute(policy, "schema", || session.schema(config)).await
}

/// Update re-detected open discoveries in place, create new ones and
/// reject open ones that were not re-detected. Returns how many were
/// created.
async fn reconcile(
    store: &Arc<dyn StatusStore>,
    policy: &RetryPolicy,
    silo_id: &str,
    changes: Vec<DiscoveryData>,
) -> CustodianResult<usize> {
    let existing = activity::execute(policy, "discoveries", || store.discoveries(silo_id)).await?;
    let mut open: BTreeMap<DiscoveryKey, DataDiscovery> = existing
        .into_iter()
        .filter(|d| d.status == DiscoveryStatus::Open)
        .map(|d| (d.data.key(), d))
        .collect();

    let mut seen = HashSet::new();
    let mut created = 0;
    for data in changes {
        let key = data.key();
        if !seen.insert(key.clone()) {
            continue;
        }
        let discovery = match open.remove(&key) {
            Some(mut current) => {
                current.data = data;
                current
            }
            None => {
                created += 1;
                DataDiscovery {
                    id: uuid::Uuid::new_v4().to_string(),
                    silo_definition_id: silo_id.to_string(),
                    status: DiscoveryStatus::Open,
                    data,
                    created_at: Utc::now(),
                }
            }
        };
        activity::execute(policy, "upsert_discovery", || {
            store.upsert_discovery(discovery.clone())
        })
        .await?;
    }

    for (_, mut stale) in open {
        debug!(discovery_id = %stale.id, "Closing discovery no longer detected");
        stale.status = DiscoveryStatus::Rejected;
        activity::execute(policy, "upsert_discovery", || {
            store.upsert_discovery(stale.clone())
        })
        .await?;
    }
    Ok(created)
}
