//! Core data model for the Custodian request orchestration engine.
//!
//! Jobs, requests and their per-data-source units of work, silo
//! definitions, extracted results and discoveries. Every crate of the
//! workspace speaks in these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod discovery;
mod job;
mod request;
mod result;
mod secret;
mod silo;
mod telemetry;

pub use discovery::{DataDiscovery, DiscoveryData, DiscoveryKey, DiscoveryStatus, DiscoveryType};
pub use job::{Job, JobKind, JobStatus, SiloOutcome};
pub use request::{PrimaryKeyValue, Request, RequestKind, RequestStatus, RequestStatusType};
pub use result::{QueryResult, ResultType};
pub use secret::SecretString;
pub use silo::{
    DataSource, DataSourceBuilder, Property, PropertyBuilder, SiloDefinition,
    SiloDefinitionBuilder, SiloSpecification, SiloSpecificationBuilder,
};
pub use telemetry::{LogFormat, TELEMETRY_TARGET, init_telemetry};
