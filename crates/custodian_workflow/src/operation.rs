//! Per-kind start and extraction behaviour of a request.

use async_trait::async_trait;
use custodian_core::RequestKind;
use custodian_error::CustodianResult;
use custodian_protocol::{ConnectorSession, DataType, ProtocolStream, Query, RequestResult};

/// What a request kind does on its connector.
#[async_trait]
pub trait RequestOperation: Send + Sync {
    /// Start one operation per identifier.
    async fn start(
        &self,
        session: &dyn ConnectorSession,
        config: &serde_json::Value,
        query: &Query,
    ) -> CustodianResult<ProtocolStream<RequestResult>>;

    /// Whether a completed operation reporting `data_type` has a payload
    /// to extract.
    fn needs_extraction(&self, data_type: Option<DataType>) -> bool;
}

#[async_trait]
impl RequestOperation for RequestKind {
    async fn start(
        &self,
        session: &dyn ConnectorSession,
        config: &serde_json::Value,
        query: &Query,
    ) -> CustodianResult<ProtocolStream<RequestResult>> {
        match self {
            RequestKind::Query => session.query(config, query).await,
            RequestKind::Delete => session.delete(config, query).await,
        }
    }

    fn needs_extraction(&self, data_type: Option<DataType>) -> bool {
        match self {
            RequestKind::Query => matches!(data_type, Some(DataType::Records | DataType::File)),
            RequestKind::Delete => false,
        }
    }
}
