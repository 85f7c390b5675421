//! Shared collaborators handed to every workflow actor.

use crate::{LogStaleSignals, StaleSignalHook, WorkflowConfig};
use custodian_protocol::ConnectorFactory;
use custodian_storage::{LogStore, StatusStore};
use std::sync::Arc;

/// Store, connector factory, log store and configuration of one engine.
///
/// Cheap to clone; every actor holds its own copy.
#[derive(Clone)]
pub struct WorkflowContext {
    store: Arc<dyn StatusStore>,
    connectors: Arc<dyn ConnectorFactory>,
    logs: Arc<dyn LogStore>,
    config: WorkflowConfig,
    stale_signal_hook: Arc<dyn StaleSignalHook>,
}

impl WorkflowContext {
    /// Assemble a context with the default stale-signal hook.
    pub fn new(
        store: Arc<dyn StatusStore>,
        connectors: Arc<dyn ConnectorFactory>,
        logs: Arc<dyn LogStore>,
        config: WorkflowConfig,
    ) -> Self {
        Self {
            store,
            connectors,
            logs,
            config,
            stale_signal_hook: Arc::new(LogStaleSignals),
        }
    }

    /// Replace the stale-signal hook.
    pub fn with_stale_signal_hook(mut self, hook: impl StaleSignalHook + 'static) -> Self {
        self.stale_signal_hook = Arc::new(hook);
        self
    }

    /// Status/result store.
    pub fn store(&self) -> &Arc<dyn StatusStore> {
        &self.store
    }

    /// Connector session factory.
    pub fn connectors(&self) -> &Arc<dyn ConnectorFactory> {
        &self.connectors
    }

    /// Job log artifact store.
    pub fn logs(&self) -> &Arc<dyn LogStore> {
        &self.logs
    }

    /// Workflow configuration.
    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Stale-signal diagnostics hook.
    pub fn stale_signal_hook(&self) -> &Arc<dyn StaleSignalHook> {
        &self.stale_signal_hook
    }
}

impl std::fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
