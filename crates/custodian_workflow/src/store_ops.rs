//! Retried store access used by the coordinators and the orchestrator.

use crate::{RetryPolicy, activity};
use custodian_core::{QueryResult, RequestStatus, RequestStatusType, SecretString};
use custodian_error::CustodianResult;
use custodian_storage::StatusStore;
use std::sync::Arc;
use tracing::{debug, error};

/// Store writes and reads, each one external step under a retry policy.
#[derive(Clone)]
pub(crate) struct StoreOps {
    store: Arc<dyn StatusStore>,
    policy: RetryPolicy,
}

impl StoreOps {
    pub(crate) fn new(store: Arc<dyn StatusStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub(crate) fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub(crate) async fn statuses_for_silo(
        &self,
        request_id: &str,
        silo_id: &str,
    ) -> CustodianResult<Vec<RequestStatus>> {
        activity::execute(&self.policy, "request_statuses_for_silo", || {
            self.store.request_statuses_for_silo(request_id, silo_id)
        })
        .await
    }

    pub(crate) async fn statuses(&self, request_id: &str) -> CustodianResult<Vec<RequestStatus>> {
        activity::execute(&self.policy, "request_statuses", || {
            self.store.request_statuses(request_id)
        })
        .await
    }

    /// Persist a status, keeping the stored handle when `handle` is `None`.
    pub(crate) async fn set_status(
        &self,
        request_status_id: &str,
        status: RequestStatusType,
        handle: Option<SecretString>,
    ) -> CustodianResult<RequestStatus> {
        let written = activity::execute(&self.policy, "update_request_status", || {
            self.store
                .update_request_status(request_status_id, status, handle.clone())
        })
        .await?;
        debug!(request_status_id, %status, "Persisted request status");
        Ok(written)
    }

    /// Persist a status, logging instead of propagating a write failure.
    /// Returns whether the write landed.
    pub(crate) async fn set_status_logged(
        &self,
        request_status_id: &str,
        status: RequestStatusType,
    ) -> bool {
        match self.set_status(request_status_id, status, None).await {
            Ok(_) => true,
            Err(e) => {
                error!(request_status_id, %status, error = %e, "Failed to persist request status");
                false
            }
        }
    }

    pub(crate) async fn save_result(&self, result: QueryResult) -> CustodianResult<QueryResult> {
        activity::execute(&self.policy, "create_query_result", || {
            self.store.create_query_result(result.clone())
        })
        .await
    }

    /// Force every non-terminal status of a request to `Failed`.
    /// Returns how many were swept.
    pub(crate) async fn sweep_non_terminal(&self, request_id: &str) -> CustodianResult<usize> {
        let mut swept = 0;
        for status in self.statuses(request_id).await? {
            if status.status.is_terminal() {
                continue;
            }
            self.set_status(&status.id, RequestStatusType::Failed, None)
                .await?;
            swept += 1;
        }
        Ok(swept)
    }
}
