//! Store contents shared by the in-memory and file-backed stores.

use chrono::Utc;
use custodian_core::{
    DataDiscovery, Job, JobStatus, QueryResult, Request, RequestStatus, RequestStatusType,
    SecretString, SiloDefinition,
};
use custodian_error::{CustodianResult, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Every persisted record, keyed by id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StoreState {
    #[serde(default)]
    jobs: BTreeMap<String, Job>,
    #[serde(default)]
    requests: BTreeMap<String, Request>,
    #[serde(default)]
    request_statuses: BTreeMap<String, RequestStatus>,
    #[serde(default)]
    query_results: BTreeMap<String, QueryResult>,
    #[serde(default)]
    silos: BTreeMap<String, SiloDefinition>,
    #[serde(default)]
    discoveries: Vec<DataDiscovery>,
    #[serde(skip)]
    pub(crate) status_history: HashMap<String, Vec<RequestStatusType>>,
    #[serde(skip)]
    pub(crate) job_history: HashMap<String, Vec<JobStatus>>,
}

impl StoreState {
    pub(crate) fn find_or_create_job(&mut self, job: Job) -> Job {
        if let Some(existing) = self.jobs.get(job.id()) {
            return existing.clone();
        }
        self.job_history
            .entry(job.id().clone())
            .or_default()
            .push(*job.status());
        self.jobs.insert(job.id().clone(), job.clone());
        job
    }

    pub(crate) fn get_job(&self, id: &str) -> CustodianResult<Job> {
        self.jobs
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("job", id).into())
    }

    pub(crate) fn update_job_status(
        &mut self,
        id: &str,
        status: JobStatus,
    ) -> CustodianResult<Job> {
        let job = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("job", id))?;
        if job.set_status(status, Utc::now()) {
            self.job_history.entry(id.to_string()).or_default().push(status);
        }
        Ok(job.clone())
    }

    pub(crate) fn get_request(&self, id: &str) -> CustodianResult<Request> {
        self.requests
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("request", id).into())
    }

    pub(crate) fn link_request_job(
        &mut self,
        request_id: &str,
        job_id: &str,
    ) -> CustodianResult<()> {
        let request = self
            .requests
            .get_mut(request_id)
            .ok_or_else(|| StoreError::not_found("request", request_id))?;
        request.job_id = Some(job_id.to_string());
        Ok(())
    }

    pub(crate) fn request_statuses(&self, request_id: &str) -> Vec<RequestStatus> {
        self.request_statuses
            .values()
            .filter(|rs| rs.request_id == request_id)
            .cloned()
            .collect()
    }

    pub(crate) fn request_statuses_for_silo(
        &self,
        request_id: &str,
        silo_definition_id: &str,
    ) -> CustodianResult<Vec<RequestStatus>> {
        let silo = self.get_silo_definition(silo_definition_id)?;
        Ok(self
            .request_statuses
            .values()
            .filter(|rs| {
                rs.request_id == request_id && silo.data_source(&rs.data_source_id).is_some()
            })
            .cloned()
            .collect())
    }

    pub(crate) fn get_request_status(&self, id: &str) -> CustodianResult<RequestStatus> {
        self.request_statuses
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("request status", id).into())
    }

    pub(crate) fn update_request_status(
        &mut self,
        id: &str,
        status: RequestStatusType,
        handle: Option<SecretString>,
    ) -> CustodianResult<RequestStatus> {
        let rs = self
            .request_statuses
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found("request status", id))?;
        let changed = rs.status != status || (handle.is_some() && handle != rs.handle);
        rs.status = status;
        if handle.is_some() {
            rs.handle = handle;
        }
        if changed {
            self.status_history.entry(id.to_string()).or_default().push(status);
        }
        Ok(rs.clone())
    }

    pub(crate) fn create_query_result(
        &mut self,
        result: QueryResult,
    ) -> CustodianResult<QueryResult> {
        let rs = self
            .request_statuses
            .get_mut(&result.request_status_id)
            .ok_or_else(|| StoreError::not_found("request status", &result.request_status_id))?;
        if let Some(previous) = rs.query_result_id.replace(result.id.clone())
            && previous != result.id
        {
            self.query_results.remove(&previous);
        }
        self.query_results.insert(result.id.clone(), result.clone());
        Ok(result)
    }

    pub(crate) fn query_result(
        &self,
        request_status_id: &str,
    ) -> CustodianResult<Option<QueryResult>> {
        let rs = self.get_request_status(request_status_id)?;
        Ok(rs
            .query_result_id
            .and_then(|id| self.query_results.get(&id).cloned()))
    }

    pub(crate) fn silo_definitions(&self, workspace_id: &str) -> Vec<SiloDefinition> {
        self.silos
            .values()
            .filter(|s| s.workspace_id() == workspace_id)
            .cloned()
            .collect()
    }

    pub(crate) fn get_silo_definition(&self, id: &str) -> CustodianResult<SiloDefinition> {
        self.silos
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("silo definition", id).into())
    }

    pub(crate) fn discoveries(&self, silo_definition_id: &str) -> Vec<DataDiscovery> {
        self.discoveries
            .iter()
            .filter(|d| d.silo_definition_id == silo_definition_id)
            .cloned()
            .collect()
    }

    pub(crate) fn upsert_discovery(&mut self, discovery: DataDiscovery) -> DataDiscovery {
        match self.discoveries.iter_mut().find(|d| d.id == discovery.id) {
            Some(existing) => *existing = discovery.clone(),
            None => self.discoveries.push(discovery.clone()),
        }
        discovery
    }

    pub(crate) fn put_silo_definition(&mut self, silo: SiloDefinition) {
        self.silos.insert(silo.id().clone(), silo);
    }

    pub(crate) fn put_request(&mut self, request: Request) {
        self.requests.insert(request.id.clone(), request);
    }

    pub(crate) fn put_request_status(&mut self, status: RequestStatus) {
        self.request_statuses.insert(status.id.clone(), status);
    }
}
