//! Custodian - data-subject request orchestration.
//!
//! Custodian executes data-subject requests (find or delete a person's data)
//! across every data silo of a workspace. Each silo is reached through a
//! connector process; the engine starts the work, polls it to completion,
//! extracts results and keeps a durable status per data source.
//!
//! # Architecture
//!
//! Custodian is organized as a workspace with focused crates:
//!
//! - `custodian_error` - Error types
//! - `custodian_core` - Data model and telemetry setup
//! - `custodian_protocol` - Connector session interface and adapters
//! - `custodian_storage` - Status, result and log stores
//! - `custodian_workflow` - Orchestration actors, job tracking, discovery
//!
//! This crate re-exports them, wires the production collaborators together
//! and ships the `custodian` binary.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod runtime;
pub mod worker;

pub use config::{ConnectorConfig, CustodianConfig};
pub use runtime::build_engine;
pub use worker::{WorkerCommand, WorkerSummary};

pub use custodian_core::*;
pub use custodian_error::*;
pub use custodian_protocol::{
    CommandConnectorFactory, ConnectorFactory, ConnectorSession, DataSourceMatcher,
    ScriptedConnector, ScriptedFactory,
};
pub use custodian_storage::{
    AdminStore, FileSystemLogStore, JsonFileStore, LogStore, MemoryLogStore, MemoryStore,
    StatusStore,
};
pub use custodian_workflow::{
    DiscoverSourcesArgs, Engine, ExecuteRequestArgs, OrchestrationHandle, RetryPolicy,
    SILO_UPDATE_STATUS, SiloUpdateStatus, StaleReason, StaleSignalHook, WorkflowConfig,
    WorkflowContext, diff_catalog,
};
