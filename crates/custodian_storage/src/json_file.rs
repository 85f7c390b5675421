//! Store persisted as a JSON snapshot file.

use crate::state::StoreState;
use crate::{AdminStore, MemoryStore, StatusStore};
use async_trait::async_trait;
use custodian_core::{
    DataDiscovery, Job, JobStatus, QueryResult, Request, RequestStatus, RequestStatusType,
    SecretString, SiloDefinition,
};
use custodian_error::{CustodianResult, StoreError, StoreErrorKind};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Store that rewrites a JSON snapshot after every write.
///
/// Snapshots are written to a temporary file and renamed into place, so a
/// crash leaves either the previous or the new snapshot.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
    persist_lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open the snapshot at `path`, starting empty if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// its directory cannot be created.
    #[tracing::instrument(skip(path))]
    pub async fn open(path: impl Into<PathBuf>) -> CustodianResult<Self> {
        let path = path.into();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StoreError::new(StoreErrorKind::DirectoryCreation(format!(
                    "{}: {}",
                    parent.display(),
                    e
                )))
            })?;
        }

        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<StoreState>(&bytes).map_err(|e| {
                StoreError::new(StoreErrorKind::Serialization(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreState::default(),
            Err(e) => {
                return Err(StoreError::new(StoreErrorKind::Read(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
                .into());
            }
        };

        tracing::info!(path = %path.display(), "Opened JSON file store");
        Ok(Self {
            path,
            inner: MemoryStore::from_state(state),
            persist_lock: Mutex::new(()),
        })
    }

    /// Location of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self) -> CustodianResult<()> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.inner.snapshot().await;
        let body = serde_json::to_vec_pretty(&snapshot).map_err(|e| {
            StoreError::new(StoreErrorKind::Serialization(e.to_string()))
        })?;

        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, body).await.map_err(|e| {
            StoreError::new(StoreErrorKind::Write(format!(
                "{}: {}",
                temp_path.display(),
                e
            )))
        })?;
        tokio::fs::rename(&temp_path, &self.path).await.map_err(|e| {
            StoreError::new(StoreErrorKind::Write(format!(
                "rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            )))
        })?;

        tracing::trace!(path = %self.path.display(), "Persisted store snapshot");
        Ok(())
    }
}

#[async_trait]
impl StatusStore for JsonFileStore {
    async fn find_or_create_job(&self, job: Job) -> CustodianResult<Job> {
        let job = self.inner.find_or_create_job(job).await?;
        self.persist().await?;
        Ok(job)
    }

    async fn get_job(&self, id: &str) -> CustodianResult<Job> {
        self.inner.get_job(id).await
    }

    async fn update_job_status(&self, id: &str, status: JobStatus) -> CustodianResult<Job> {
        let job = self.inner.update_job_status(id, status).await?;
        self.persist().await?;
        Ok(job)
    }

    async fn get_request(&self, id: &str) -> CustodianResult<Request> {
        self.inner.get_request(id).await
    }

    async fn link_request_job(&self, request_id: &str, job_id: &str) -> CustodianResult<()> {
        self.inner.link_request_job(request_id, job_id).await?;
        self.persist().await
    }

    async fn request_statuses(&self, request_id: &str) -> CustodianResult<Vec<RequestStatus>> {
        self.inner.request_statuses(request_id).await
    }

    async fn request_statuses_for_silo(
        &self,
        request_id: &str,
        silo_definition_id: &str,
    ) -> CustodianResult<Vec<RequestStatus>> {
        self.inner
            .request_statuses_for_silo(request_id, silo_definition_id)
            .await
    }

    async fn get_request_status(&self, id: &str) -> CustodianResult<RequestStatus> {
        self.inner.get_request_status(id).await
    }

    async fn update_request_status(
        &self,
        id: &str,
        status: RequestStatusType,
        handle: Option<SecretString>,
    ) -> CustodianResult<RequestStatus> {
        let rs = self.inner.update_request_status(id, status, handle).await?;
        self.persist().await?;
        Ok(rs)
    }

    async fn create_query_result(&self, result: QueryResult) -> CustodianResult<QueryResult> {
        let result = self.inner.create_query_result(result).await?;
        self.persist().await?;
        Ok(result)
    }

    async fn query_result(&self, request_status_id: &str) -> CustodianResult<Option<QueryResult>> {
        self.inner.query_result(request_status_id).await
    }

    async fn silo_definitions(&self, workspace_id: &str) -> CustodianResult<Vec<SiloDefinition>> {
        self.inner.silo_definitions(workspace_id).await
    }

    async fn get_silo_definition(&self, id: &str) -> CustodianResult<SiloDefinition> {
        self.inner.get_silo_definition(id).await
    }

    async fn discoveries(&self, silo_definition_id: &str) -> CustodianResult<Vec<DataDiscovery>> {
        self.inner.discoveries(silo_definition_id).await
    }

    async fn upsert_discovery(&self, discovery: DataDiscovery) -> CustodianResult<DataDiscovery> {
        let discovery = self.inner.upsert_discovery(discovery).await?;
        self.persist().await?;
        Ok(discovery)
    }
}

#[async_trait]
impl AdminStore for JsonFileStore {
    async fn put_silo_definition(&self, silo: SiloDefinition) -> CustodianResult<()> {
        self.inner.put_silo_definition(silo).await?;
        self.persist().await
    }

    async fn put_request(&self, request: Request) -> CustodianResult<()> {
        self.inner.put_request(request).await?;
        self.persist().await
    }

    async fn put_request_status(&self, status: RequestStatus) -> CustodianResult<()> {
        self.inner.put_request_status(status).await?;
        self.persist().await
    }
}
