//! Wiring of the production collaborators.

use crate::CustodianConfig;
use custodian_error::CustodianResult;
use custodian_protocol::CommandConnectorFactory;
use custodian_storage::{FileSystemLogStore, JsonFileStore};
use custodian_workflow::{Engine, WorkflowContext};
use std::sync::Arc;
use tracing::{info, instrument};

/// Build an engine over the JSON file store, the filesystem log store and
/// the local-process connector adapter.
///
/// # Errors
///
/// Returns an error if the store snapshot cannot be opened or the log
/// directory cannot be created.
#[instrument(skip(config), fields(store = %config.store_path().display()))]
pub async fn build_engine(config: &CustodianConfig) -> CustodianResult<Engine> {
    let store = JsonFileStore::open(config.store_path().clone()).await?;
    let logs = FileSystemLogStore::new(config.log_dir().clone())?;
    let connectors = match config.connector().work_dir() {
        Some(dir) => CommandConnectorFactory::with_work_root(dir.clone()),
        None => CommandConnectorFactory::new(),
    };

    let context = WorkflowContext::new(
        Arc::new(store),
        Arc::new(connectors),
        Arc::new(logs),
        config.workflow().clone(),
    );
    info!("Engine ready");
    Ok(Engine::new(context))
}
