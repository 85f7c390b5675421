//! Entry point tying jobs, signals and orchestrations together.

use crate::orchestrator::{
    OrchestratorArgs, OrchestratorMessage, RequestOrchestrator, settle_interrupted,
};
use crate::{
    DiscoverSourcesArgs, ExecuteRequestArgs, SiloUpdateStatus, StaleReason, WorkflowContext,
    activity, discovery,
};
use custodian_core::JobStatus;
use custodian_error::{AggregateError, CustodianResult, WorkflowError, WorkflowErrorKind};
use ractor::{Actor, ActorRef};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, oneshot};
use tracing::{debug, error, info, instrument, warn};

/// Runs execution and discovery jobs and routes signals to running
/// orchestrations.
///
/// Cheap to clone; clones share the table of running orchestrations.
#[derive(Clone)]
pub struct Engine {
    context: WorkflowContext,
    running: Arc<RwLock<HashMap<String, ActorRef<OrchestratorMessage>>>>,
}

impl Engine {
    /// Engine over a set of collaborators.
    pub fn new(context: WorkflowContext) -> Self {
        Self {
            context,
            running: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Shared collaborators.
    pub fn context(&self) -> &WorkflowContext {
        &self.context
    }

    /// Spawn the orchestrator of one execution job.
    ///
    /// # Errors
    ///
    /// Returns an error if the orchestrator actor cannot be spawned.
    #[instrument(skip(self), fields(request_id = %args.request_id, job_id = %args.job_id))]
    pub async fn start_request(
        &self,
        args: ExecuteRequestArgs,
    ) -> CustodianResult<OrchestrationHandle> {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (done_tx, done_rx) = oneshot::channel();
        let request_id = args.request_id.clone();
        let job_id = args.job_id.clone();
        let execution = args.clone();

        let orchestrator_args = OrchestratorArgs {
            context: self.context.clone(),
            execution: args,
            done: outcome_tx,
        };
        let (actor, join) = Actor::spawn(None, RequestOrchestrator, orchestrator_args)
            .await
            .map_err(|e| {
                error!(error = ?e, "Failed to spawn request orchestrator");
                WorkflowError::new(WorkflowErrorKind::OrchestratorSpawnFailed {
                    job_id: job_id.clone(),
                    reason: e.to_string(),
                })
            })?;

        if let Some(previous) = self
            .running
            .write()
            .await
            .insert(request_id.clone(), actor.clone())
        {
            warn!(previous = %previous.get_id(), "Request already had a running orchestration");
        }

        let running = self.running.clone();
        let context = self.context.clone();
        let actor_id = actor.get_id();
        tokio::spawn(async move {
            if let Err(e) = join.await {
                warn!(error = %e, "Request orchestrator task failed");
            }
            {
                let mut running = running.write().await;
                if running.get(&request_id).map(|a| a.get_id()) == Some(actor_id) {
                    running.remove(&request_id);
                }
            }
            let result = match outcome_rx.await {
                Ok(result) => result,
                Err(_) => recover_lost_outcome(&context, &execution).await,
            };
            if done_tx.send(result).is_err() {
                debug!(job_id = %execution.job_id, "Job outcome receiver dropped");
            }
        });

        info!("Request orchestration started");
        Ok(OrchestrationHandle {
            actor,
            done: done_rx,
            job_id,
        })
    }

    /// Execute one request to completion and return the final Job status.
    ///
    /// # Errors
    ///
    /// Returns an error if the Job could not be opened, the request or its
    /// silos could not be loaded, or the final status write failed.
    pub async fn execute_request(&self, args: ExecuteRequestArgs) -> CustodianResult<JobStatus> {
        self.start_request(args).await?.wait().await
    }

    /// Route a `silo-update-status` signal to the orchestration running
    /// the named RequestStatus's request.
    ///
    /// Returns `false` when the signal names an unknown RequestStatus or no
    /// orchestration is running for its request.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store fails while looking the
    /// RequestStatus up.
    #[instrument(skip(self), fields(request_status_id = %signal.request_status_id))]
    pub async fn signal(&self, signal: SiloUpdateStatus) -> CustodianResult<bool> {
        let store = self.context.store().clone();
        let lookup = activity::execute(
            self.context.config().orchestrator_retry(),
            "get_request_status",
            || store.get_request_status(&signal.request_status_id),
        )
        .await;
        let status = match lookup {
            Ok(status) => status,
            Err(e) if e.is_not_found() => {
                self.context
                    .stale_signal_hook()
                    .on_stale(&signal, StaleReason::UnknownStatus);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let actor = self.running.read().await.get(&status.request_id).cloned();
        let Some(actor) = actor else {
            self.context
                .stale_signal_hook()
                .on_stale(&signal, StaleReason::NotRunning);
            return Ok(false);
        };

        match actor.send_message(OrchestratorMessage::Signal(signal.clone())) {
            Ok(()) => {
                debug!(request_id = %status.request_id, "Signal routed");
                Ok(true)
            }
            Err(e) => {
                debug!(error = ?e, "Orchestration finished before signal delivery");
                self.context
                    .stale_signal_hook()
                    .on_stale(&signal, StaleReason::NotRunning);
                Ok(false)
            }
        }
    }

    /// Whether an orchestration is running for a request.
    pub async fn is_running(&self, request_id: &str) -> bool {
        self.running.read().await.contains_key(request_id)
    }

    /// Run one discovery job; returns the number of new discoveries.
    ///
    /// # Errors
    ///
    /// Returns the error that failed the job.
    pub async fn discover_sources(&self, args: DiscoverSourcesArgs) -> CustodianResult<usize> {
        discovery::discover_sources(&self.context, args).await
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// A running orchestration.
#[derive(Debug)]
pub struct OrchestrationHandle {
    actor: ActorRef<OrchestratorMessage>,
    done: oneshot::Receiver<CustodianResult<JobStatus>>,
    job_id: String,
}

impl OrchestrationHandle {
    /// Job this orchestration runs.
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Deliver a signal straight to this orchestration.
    ///
    /// # Errors
    ///
    /// Returns an error if the orchestration has already stopped.
    pub fn signal(&self, signal: SiloUpdateStatus) -> CustodianResult<()> {
        self.actor
            .send_message(OrchestratorMessage::Signal(signal))
            .map_err(|e| WorkflowError::new(WorkflowErrorKind::Messaging(e.to_string())).into())
    }

    /// Stop this orchestration early.
    ///
    /// Running coordinators tear their sessions down, leftover statuses are
    /// swept to `Failed` and the Job is closed with the status they imply.
    pub fn cancel(&self) {
        info!(job_id = %self.job_id, "Cancelling request orchestration");
        self.actor.stop(Some("cancelled".to_string()));
    }

    /// Wait for the final Job status.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the orchestration, or `OutcomeLost` if
    /// it stopped without resolving.
    pub async fn wait(self) -> CustodianResult<JobStatus> {
        let Self { done, job_id, .. } = self;
        match done.await {
            Ok(result) => result,
            Err(_) => Err(WorkflowError::new(WorkflowErrorKind::OutcomeLost(job_id)).into()),
        }
    }
}

/// Close the Job of an orchestrator that died without resolving, then
/// report the loss.
async fn recover_lost_outcome(
    context: &WorkflowContext,
    execution: &ExecuteRequestArgs,
) -> CustodianResult<JobStatus> {
    let lost = WorkflowError::new(WorkflowErrorKind::OutcomeLost(execution.job_id.clone()));
    error!(error = %lost, "Request orchestrator died without resolving its job");
    match settle_interrupted(context, execution).await {
        Ok(status) => {
            warn!(job_id = %execution.job_id, %status, "Closed job of lost orchestration");
            Err(lost.into())
        }
        Err(e) => Err(AggregateError::new(vec![lost.into(), e]).into()),
    }
}
