//! Request orchestration for Custodian.
//!
//! An execution job runs one [`RequestOrchestrator`] actor, which spawns a
//! [`SiloCoordinator`] per silo of the workspace. Each coordinator drives
//! its silo's connector from start through polling and extraction to a
//! terminal status per data source. The orchestrator aggregates silo
//! outcomes into the Job status through the [`JobTracker`].
//!
//! [`Engine`] is the entry point: it starts orchestrations, routes
//! `silo-update-status` signals to them and runs discovery jobs.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod activity;
mod config;
mod connector_logs;
mod context;
mod coordinator;
mod discovery;
mod engine;
mod job_tracker;
mod operation;
mod orchestrator;
mod payloads;
mod signal;
mod store_ops;

pub use config::{RetryPolicy, RetryPolicyBuilder, WorkflowConfig, WorkflowConfigBuilder};
pub use context::WorkflowContext;
pub use coordinator::{
    CoordinatorArgs, CoordinatorMessage, CoordinatorState, ReportFn, SiloCoordinator, SiloReport,
};
pub use discovery::diff_catalog;
pub use engine::{Engine, OrchestrationHandle};
pub use job_tracker::JobTracker;
pub use operation::RequestOperation;
pub use orchestrator::{
    OrchestratorArgs, OrchestratorMessage, OrchestratorState, RequestOrchestrator,
};
pub use payloads::{DiscoverSourcesArgs, ExecuteRequestArgs};
pub use signal::{
    LogStaleSignals, SILO_UPDATE_STATUS, SiloUpdateStatus, StaleReason, StaleSignalHook,
};
