//! Connector session and factory traits.

use crate::{
    LogMessage, ProtocolStream, Query, Record, RequestResult, RequestStatusMessage,
    RequestsMessage, SchemasMessage,
};
use async_trait::async_trait;
use custodian_core::SiloSpecification;
use custodian_error::CustodianResult;
use futures::stream::BoxStream;
use std::sync::Arc;

/// One isolated connector session, owned by a single silo coordinator.
///
/// Every method takes `&self` so a session can be shared with retried
/// activity attempts through an `Arc`.
#[async_trait]
pub trait ConnectorSession: Send + Sync {
    /// Acquire the execution environment.
    async fn init_conn(&self) -> CustodianResult<()>;

    /// Fetch the schema catalog.
    async fn schema(&self, config: &serde_json::Value) -> CustodianResult<SchemasMessage>;

    /// Start export operations, one per identifier.
    async fn query(
        &self,
        config: &serde_json::Value,
        query: &Query,
    ) -> CustodianResult<ProtocolStream<RequestResult>>;

    /// Start deletion operations, one per identifier.
    async fn delete(
        &self,
        config: &serde_json::Value,
        query: &Query,
    ) -> CustodianResult<ProtocolStream<RequestResult>>;

    /// Re-check operations by replaying their handles.
    async fn request_status(
        &self,
        config: &serde_json::Value,
        requests: &RequestsMessage,
    ) -> CustodianResult<ProtocolStream<RequestStatusMessage>>;

    /// Extract the payloads of completed operations.
    async fn request_results(
        &self,
        config: &serde_json::Value,
        requests: &RequestsMessage,
    ) -> CustodianResult<ProtocolStream<Record>>;

    /// Stream connector log lines until teardown.
    async fn attach_logs(&self) -> CustodianResult<BoxStream<'static, LogMessage>>;

    /// Release the execution environment.
    async fn teardown(&self) -> CustodianResult<()>;
}

/// Opens connector sessions for silo specifications.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    /// Create a session for the connector a silo specification names.
    async fn new_session(
        &self,
        specification: &SiloSpecification,
    ) -> CustodianResult<Arc<dyn ConnectorSession>>;
}
