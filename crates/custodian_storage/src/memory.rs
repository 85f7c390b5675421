//! In-memory store.

use crate::state::StoreState;
use crate::{AdminStore, StatusStore};
use async_trait::async_trait;
use custodian_core::{
    DataDiscovery, Job, JobStatus, QueryResult, Request, RequestStatus, RequestStatusType,
    SecretString, SiloDefinition,
};
use custodian_error::{CustodianResult, StoreError, StoreErrorKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;

/// Store held entirely in memory.
///
/// Keeps a per-status write history (every write that changed a status or
/// handle) so tests can assert how many transitions an item went through.
/// Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
    outages: Arc<AtomicU32>,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_state(state: StoreState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            outages: Arc::default(),
        }
    }

    pub(crate) async fn snapshot(&self) -> StoreState {
        self.state.read().await.clone()
    }

    /// Fail the next `count` writes with a retryable outage.
    pub fn fail_next_writes(&self, count: u32) {
        self.outages.store(count, Ordering::SeqCst);
    }

    /// Statuses written for a request status, in order.
    pub async fn status_history(&self, request_status_id: &str) -> Vec<RequestStatusType> {
        self.state
            .read()
            .await
            .status_history
            .get(request_status_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Statuses written for a job, in order, starting with its initial status.
    pub async fn job_history(&self, job_id: &str) -> Vec<JobStatus> {
        self.state
            .read()
            .await
            .job_history
            .get(job_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn write<T>(
        &self,
        apply: impl FnOnce(&mut StoreState) -> CustodianResult<T> + Send,
    ) -> CustodianResult<T> {
        let injected = self
            .outages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::new(StoreErrorKind::Unavailable(
                "injected store outage".to_string(),
            ))
            .into());
        }
        let mut state = self.state.write().await;
        apply(&mut state)
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    async fn find_or_create_job(&self, job: Job) -> CustodianResult<Job> {
        self.write(|s| Ok(s.find_or_create_job(job))).await
    }

    async fn get_job(&self, id: &str) -> CustodianResult<Job> {
        self.state.read().await.get_job(id)
    }

    async fn update_job_status(&self, id: &str, status: JobStatus) -> CustodianResult<Job> {
        self.write(|s| s.update_job_status(id, status)).await
    }

    async fn get_request(&self, id: &str) -> CustodianResult<Request> {
        self.state.read().await.get_request(id)
    }

    async fn link_request_job(&self, request_id: &str, job_id: &str) -> CustodianResult<()> {
        self.write(|s| s.link_request_job(request_id, job_id)).await
    }

    async fn request_statuses(&self, request_id: &str) -> CustodianResult<Vec<RequestStatus>> {
        Ok(self.state.read().await.request_statuses(request_id))
    }

    async fn request_statuses_for_silo(
        &self,
        request_id: &str,
        silo_definition_id: &str,
    ) -> CustodianResult<Vec<RequestStatus>> {
        self.state
            .read()
            .await
            .request_statuses_for_silo(request_id, silo_definition_id)
    }

    async fn get_request_status(&self, id: &str) -> CustodianResult<RequestStatus> {
        self.state.read().await.get_request_status(id)
    }

    async fn update_request_status(
        &self,
        id: &str,
        status: RequestStatusType,
        handle: Option<SecretString>,
    ) -> CustodianResult<RequestStatus> {
        self.write(|s| s.update_request_status(id, status, handle)).await
    }

    async fn create_query_result(&self, result: QueryResult) -> CustodianResult<QueryResult> {
        self.write(|s| s.create_query_result(result)).await
    }

    async fn query_result(&self, request_status_id: &str) -> CustodianResult<Option<QueryResult>> {
        self.state.read().await.query_result(request_status_id)
    }

    async fn silo_definitions(&self, workspace_id: &str) -> CustodianResult<Vec<SiloDefinition>> {
        Ok(self.state.read().await.silo_definitions(workspace_id))
    }

    async fn get_silo_definition(&self, id: &str) -> CustodianResult<SiloDefinition> {
        self.state.read().await.get_silo_definition(id)
    }

    async fn discoveries(&self, silo_definition_id: &str) -> CustodianResult<Vec<DataDiscovery>> {
        Ok(self.state.read().await.discoveries(silo_definition_id))
    }

    async fn upsert_discovery(&self, discovery: DataDiscovery) -> CustodianResult<DataDiscovery> {
        self.write(|s| Ok(s.upsert_discovery(discovery))).await
    }
}

#[async_trait]
impl AdminStore for MemoryStore {
    async fn put_silo_definition(&self, silo: SiloDefinition) -> CustodianResult<()> {
        self.state.write().await.put_silo_definition(silo);
        Ok(())
    }

    async fn put_request(&self, request: Request) -> CustodianResult<()> {
        self.state.write().await.put_request(request);
        Ok(())
    }

    async fn put_request_status(&self, status: RequestStatus) -> CustodianResult<()> {
        self.state.write().await.put_request_status(status);
        Ok(())
    }
}
