//! Error types for the Custodian request orchestration engine.
//!
//! Each concern gets its own `XxxError` struct carrying a kind enum plus the
//! source location where it was raised. [`CustodianError`] wraps all of them.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod aggregate;
mod config;
mod connector;
mod error;
mod json;
mod store;
mod workflow;

pub use aggregate::AggregateError;
pub use config::{ConfigError, ConfigErrorKind};
pub use connector::{ConnectorError, ConnectorErrorKind};
pub use error::{CustodianError, CustodianErrorKind, CustodianResult};
pub use json::JsonError;
pub use store::{StoreError, StoreErrorKind};
pub use workflow::{WorkflowError, WorkflowErrorKind};
