//! Status/result store interface.

use async_trait::async_trait;
use custodian_core::{
    DataDiscovery, Job, JobStatus, QueryResult, Request, RequestStatus, RequestStatusType,
    SecretString, SiloDefinition,
};
use custodian_error::CustodianResult;

/// Durable record of jobs, requests, per-data-source statuses, results,
/// silo definitions and discoveries.
///
/// Writes are keyed by primary id, so repeating one is harmless. Every
/// write is visible to the next read.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Return the job with `job.id`, creating it from `job` if absent.
    async fn find_or_create_job(&self, job: Job) -> CustodianResult<Job>;

    /// Look up a job.
    async fn get_job(&self, id: &str) -> CustodianResult<Job>;

    /// Overwrite a job's status.
    async fn update_job_status(&self, id: &str, status: JobStatus) -> CustodianResult<Job>;

    /// Look up a request.
    async fn get_request(&self, id: &str) -> CustodianResult<Request>;

    /// Record the job executing a request.
    async fn link_request_job(&self, request_id: &str, job_id: &str) -> CustodianResult<()>;

    /// Every status of a request, ordered by id.
    async fn request_statuses(&self, request_id: &str) -> CustodianResult<Vec<RequestStatus>>;

    /// Statuses of a request whose data source belongs to a silo.
    async fn request_statuses_for_silo(
        &self,
        request_id: &str,
        silo_definition_id: &str,
    ) -> CustodianResult<Vec<RequestStatus>>;

    /// Look up one status.
    async fn get_request_status(&self, id: &str) -> CustodianResult<RequestStatus>;

    /// Overwrite a status. A `None` handle keeps the persisted one.
    async fn update_request_status(
        &self,
        id: &str,
        status: RequestStatusType,
        handle: Option<SecretString>,
    ) -> CustodianResult<RequestStatus>;

    /// Persist an extracted result and link it to its status.
    async fn create_query_result(&self, result: QueryResult) -> CustodianResult<QueryResult>;

    /// Result linked to a status, if any.
    async fn query_result(&self, request_status_id: &str) -> CustodianResult<Option<QueryResult>>;

    /// Silo definitions of a workspace, ordered by id.
    async fn silo_definitions(&self, workspace_id: &str) -> CustodianResult<Vec<SiloDefinition>>;

    /// Look up a silo definition.
    async fn get_silo_definition(&self, id: &str) -> CustodianResult<SiloDefinition>;

    /// Every discovery of a silo, ordered by creation.
    async fn discoveries(&self, silo_definition_id: &str) -> CustodianResult<Vec<DataDiscovery>>;

    /// Create or overwrite a discovery.
    async fn upsert_discovery(&self, discovery: DataDiscovery) -> CustodianResult<DataDiscovery>;
}

/// Entry points used by the administration layer to create the records
/// this engine consumes.
#[async_trait]
pub trait AdminStore: Send + Sync {
    /// Create or overwrite a silo definition.
    async fn put_silo_definition(&self, silo: SiloDefinition) -> CustodianResult<()>;

    /// Create or overwrite a request.
    async fn put_request(&self, request: Request) -> CustodianResult<()>;

    /// Create or overwrite a request status.
    async fn put_request_status(&self, status: RequestStatus) -> CustodianResult<()>;
}
