//! Request Orchestrator.
//!
//! Top-level actor of one execution job. It opens the Job, spawns one
//! linked [`SiloCoordinator`] per silo of the workspace, forwards
//! `silo-update-status` signals to the coordinator owning the named silo,
//! and finishes once every silo has reported (or died). Finishing sweeps
//! leftover non-terminal statuses to `Failed`, rolls silo outcomes up into
//! the Job status and resolves the caller's completion channel.
//!
//! An orchestration stopped before that point still closes its Job: see
//! [`settle_interrupted`].

use crate::coordinator::{
    CoordinatorArgs, CoordinatorMessage, ReportFn, SiloCoordinator, SiloReport,
};
use crate::store_ops::StoreOps;
use crate::{
    ExecuteRequestArgs, JobTracker, SiloUpdateStatus, StaleReason, WorkflowContext, activity,
};
use custodian_core::{
    Job, JobKind, JobStatus, Request, RequestStatusType, SiloDefinition, SiloOutcome,
};
use custodian_error::{AggregateError, CustodianResult, WorkflowError, WorkflowErrorKind};
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};

/// How long a stopping orchestrator waits for its coordinators to tear down.
const CHILD_STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Messages handled by a [`RequestOrchestrator`].
#[derive(Debug, Clone)]
pub enum OrchestratorMessage {
    /// Status-change hint to route to a coordinator
    Signal(SiloUpdateStatus),
    /// A coordinator finished its silo
    SiloFinished(SiloReport),
}

/// Startup arguments of a [`RequestOrchestrator`].
pub struct OrchestratorArgs {
    /// Shared collaborators
    pub context: WorkflowContext,
    /// Job trigger
    pub execution: ExecuteRequestArgs,
    /// Resolved with the final Job status, or the error that ended the run
    pub done: oneshot::Sender<CustodianResult<JobStatus>>,
}

/// Actor executing one request across every silo of a workspace.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestOrchestrator;

/// Runtime state of a [`RequestOrchestrator`].
pub struct OrchestratorState {
    context: WorkflowContext,
    execution: ExecuteRequestArgs,
    tracker: JobTracker,
    ops: StoreOps,
    done: Option<oneshot::Sender<CustodianResult<JobStatus>>>,
    job: Option<Job>,
    coordinators: HashMap<String, ActorRef<CoordinatorMessage>>,
    silo_by_actor: HashMap<ActorId, String>,
    outcomes: BTreeMap<String, SiloOutcome>,
    expected: usize,
    completed: bool,
}

impl OrchestratorState {
    fn new(args: OrchestratorArgs) -> Self {
        let tracker = JobTracker::new(&args.context);
        let ops = StoreOps::new(
            args.context.store().clone(),
            args.context.config().orchestrator_retry().clone(),
        );
        Self {
            context: args.context,
            execution: args.execution,
            tracker,
            ops,
            done: Some(args.done),
            job: None,
            coordinators: HashMap::new(),
            silo_by_actor: HashMap::new(),
            outcomes: BTreeMap::new(),
            expected: 0,
            completed: false,
        }
    }

    fn resolve(&mut self, result: CustodianResult<JobStatus>) {
        let Some(done) = self.done.take() else {
            return;
        };
        if done.send(result).is_err() {
            debug!(job_id = %self.execution.job_id, "Job outcome receiver dropped");
        }
    }

    async fn open_job(&self) -> CustodianResult<Job> {
        let args = &self.execution;
        let job = self
            .tracker
            .find_or_create_job(
                &args.job_id,
                &args.workspace_id,
                JobKind::ExecuteRequest,
                &args.request_id,
                JobStatus::Running,
            )
            .await?;
        if *job.status() == JobStatus::Running {
            return Ok(job);
        }
        self.tracker
            .update_job_status(&args.job_id, JobStatus::Running)
            .await
    }

    /// Load the request and its silos, then spawn one coordinator per silo.
    #[instrument(
        skip(self, myself),
        fields(request_id = %self.execution.request_id, job_id = %self.execution.job_id)
    )]
    async fn launch(&mut self, myself: &ActorRef<OrchestratorMessage>) -> CustodianResult<()> {
        let store = self.context.store().clone();
        let policy = self.ops.policy().clone();
        let args = self.execution.clone();

        let request = activity::execute(&policy, "get_request", || {
            store.get_request(&args.request_id)
        })
        .await?;
        if request.workspace_id != args.workspace_id {
            return Err(WorkflowError::new(WorkflowErrorKind::InvalidInput(format!(
                "request {} belongs to workspace {}, not {}",
                request.id, request.workspace_id, args.workspace_id
            )))
            .into());
        }

        activity::execute(&policy, "link_request_job", || {
            store.link_request_job(&args.request_id, &args.job_id)
        })
        .await?;

        let silos = activity::execute(&policy, "silo_definitions", || {
            store.silo_definitions(&args.workspace_id)
        })
        .await?;

        self.expected = silos.len();
        info!(silos = silos.len(), kind = %request.kind, "Spawning silo coordinators");
        for silo in silos {
            self.spawn_coordinator(myself, &request, silo).await;
        }
        Ok(())
    }

    async fn spawn_coordinator(
        &mut self,
        myself: &ActorRef<OrchestratorMessage>,
        request: &Request,
        silo: SiloDefinition,
    ) {
        let silo_id = silo.id().clone();
        let report: ReportFn = {
            let myself = myself.clone();
            Arc::new(move |report: SiloReport| {
                if let Err(e) = myself.send_message(OrchestratorMessage::SiloFinished(report)) {
                    error!(error = ?e, "Failed to deliver silo report");
                }
            })
        };
        let args = CoordinatorArgs {
            context: self.context.clone(),
            request: request.clone(),
            silo,
            log_object: self.job.as_ref().and_then(|job| job.log_object().clone()),
            report,
        };

        match Actor::spawn_linked(None, SiloCoordinator, args, myself.get_cell()).await {
            Ok((actor, _)) => {
                debug!(silo_id = %silo_id, actor = %actor.get_id(), "Spawned silo coordinator");
                self.silo_by_actor.insert(actor.get_id(), silo_id.clone());
                self.coordinators.insert(silo_id, actor);
            }
            Err(e) => {
                let err = WorkflowError::new(WorkflowErrorKind::SpawnFailed {
                    silo_id: silo_id.clone(),
                    reason: e.to_string(),
                });
                error!(error = %err, "Excluding silo from orchestration");
                self.fail_unspawned_silo(&silo_id).await;
                self.outcomes.insert(silo_id, SiloOutcome::Failed);
            }
        }
    }

    /// Mark the non-terminal statuses of a silo with no coordinator.
    async fn fail_unspawned_silo(&self, silo_id: &str) {
        let statuses = match self
            .ops
            .statuses_for_silo(&self.execution.request_id, silo_id)
            .await
        {
            Ok(statuses) => statuses,
            Err(e) => {
                warn!(silo_id, error = %e, "Could not load statuses of unspawned silo");
                return;
            }
        };
        for status in statuses.iter().filter(|s| !s.status.is_terminal()) {
            self.ops
                .set_status_logged(&status.id, RequestStatusType::Failed)
                .await;
        }
    }

    /// Record a silo's outcome. Returns `false` if one was already recorded.
    fn record_outcome(&mut self, silo_id: &str, outcome: SiloOutcome) -> bool {
        if self.outcomes.contains_key(silo_id) {
            return false;
        }
        self.outcomes.insert(silo_id.to_string(), outcome);
        debug!(
            silo_id,
            %outcome,
            finished = self.outcomes.len(),
            expected = self.expected,
            "Silo outcome recorded"
        );
        true
    }

    async fn maybe_complete(&mut self, myself: &ActorRef<OrchestratorMessage>) {
        if self.completed || self.outcomes.len() < self.expected {
            return;
        }
        self.completed = true;
        let result = self.finalize().await;
        self.resolve(result);
        myself.stop(None);
    }

    /// Sweep leftovers, aggregate and write the final Job status.
    ///
    /// A failed sweep counts as a failed silo. Every failure met on the way
    /// comes back as one [`AggregateError`].
    async fn finalize(&mut self) -> CustodianResult<JobStatus> {
        let mut causes = Vec::new();
        let orphaned = match self.ops.sweep_non_terminal(&self.execution.request_id).await {
            Ok(0) => None,
            Ok(swept) => {
                warn!(swept, "Marked leftover request statuses failed");
                Some(SiloOutcome::Failed)
            }
            Err(e) => {
                error!(error = %e, "Reconciliation sweep failed");
                causes.push(e);
                Some(SiloOutcome::Failed)
            }
        };

        let status = JobStatus::aggregate(self.outcomes.values().copied().chain(orphaned));
        if let Err(e) = self
            .tracker
            .update_job_status(&self.execution.job_id, status)
            .await
        {
            error!(error = %e, %status, "Failed to write final job status");
            causes.push(e);
        }
        AggregateError::check(causes)?;
        info!(
            request_id = %self.execution.request_id,
            job_id = %self.execution.job_id,
            %status,
            "Request orchestration finished"
        );
        Ok(status)
    }

    fn route_signal(&self, signal: SiloUpdateStatus) {
        let hook = self.context.stale_signal_hook();
        let Some(actor) = self.coordinators.get(&signal.silo_definition_id) else {
            hook.on_stale(&signal, StaleReason::UnknownSilo);
            return;
        };
        if let Err(e) = actor.send_message(CoordinatorMessage::Signal(signal.clone())) {
            debug!(error = ?e, "Coordinator mailbox closed");
            hook.on_stale(&signal, StaleReason::UnknownSilo);
        }
    }
}

#[async_trait::async_trait]
impl Actor for RequestOrchestrator {
    type Msg = OrchestratorMessage;
    type State = OrchestratorState;
    type Arguments = OrchestratorArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: OrchestratorArgs,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!(
            request_id = %args.execution.request_id,
            job_id = %args.execution.job_id,
            workspace_id = %args.execution.workspace_id,
            "Request orchestrator starting"
        );
        Ok(OrchestratorState::new(args))
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match state.open_job().await {
            Ok(job) => state.job = Some(job),
            Err(e) => {
                error!(error = %e, "Failed to open job");
                state.completed = true;
                state.resolve(Err(e));
                myself.stop(None);
                return Ok(());
            }
        }

        if let Err(e) = state.launch(&myself).await {
            error!(error = %e, "Request orchestration failed to launch");
            if let Err(update) = state
                .tracker
                .update_job_status(&state.execution.job_id, JobStatus::Failed)
                .await
            {
                error!(error = %update, "Failed to mark job failed");
            }
            state.completed = true;
            state.resolve(Err(e));
            myself.stop(None);
            return Ok(());
        }

        state.maybe_complete(&myself).await;
        Ok(())
    }

    #[instrument(skip(self, myself, state))]
    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            OrchestratorMessage::Signal(signal) => state.route_signal(signal),
            OrchestratorMessage::SiloFinished(report) => {
                if let Some(actor) = state.coordinators.remove(&report.silo_id) {
                    actor.stop(None);
                }
                if !state.record_outcome(&report.silo_id, report.outcome) {
                    warn!(silo_id = %report.silo_id, "Duplicate silo report ignored");
                    return Ok(());
                }
                state.maybe_complete(&myself).await;
            }
        }
        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        event: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let (cell, detail) = match &event {
            SupervisionEvent::ActorTerminated(cell, _, reason) => (
                cell,
                reason.clone().unwrap_or_else(|| "terminated".to_string()),
            ),
            SupervisionEvent::ActorFailed(cell, err) => (cell, err.to_string()),
            _ => return Ok(()),
        };
        let Some(silo_id) = state.silo_by_actor.get(&cell.get_id()).cloned() else {
            return Ok(());
        };
        state.coordinators.remove(&silo_id);
        if state.record_outcome(&silo_id, SiloOutcome::Failed) {
            error!(silo_id = %silo_id, detail = %detail, "Coordinator exited without reporting");
            state.maybe_complete(&myself).await;
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if !state.coordinators.is_empty() {
            debug!(coordinators = state.coordinators.len(), "Stopping silo coordinators");
            state.coordinators.clear();
        }
        myself
            .stop_children_and_wait(
                Some("request orchestration stopped".to_string()),
                Some(CHILD_STOP_TIMEOUT),
            )
            .await;

        if !state.completed {
            state.completed = true;
            warn!(
                job_id = %state.execution.job_id,
                finished = state.outcomes.len(),
                expected = state.expected,
                "Orchestration stopped before every silo reported"
            );
            let result = settle_interrupted(&state.context, &state.execution).await;
            state.resolve(result);
        }
        Ok(())
    }
}

/// Close the Job of an orchestration that stopped before finishing.
///
/// Silo reports die with the orchestrator, so the Job status is derived
/// from the persisted statuses after the leftovers are swept to `Failed`.
///
/// # Errors
///
/// Returns an [`AggregateError`] of every store failure met while closing.
pub(crate) async fn settle_interrupted(
    context: &WorkflowContext,
    execution: &ExecuteRequestArgs,
) -> CustodianResult<JobStatus> {
    let ops = StoreOps::new(
        context.store().clone(),
        context.config().orchestrator_retry().clone(),
    );
    let mut causes = Vec::new();

    match ops.sweep_non_terminal(&execution.request_id).await {
        Ok(0) => {}
        Ok(swept) => warn!(swept, "Marked interrupted request statuses failed"),
        Err(e) => {
            error!(error = %e, "Reconciliation sweep failed");
            causes.push(e);
        }
    }

    let status = match ops.statuses(&execution.request_id).await {
        Ok(statuses) => JobStatus::aggregate(statuses.iter().map(|s| match s.status {
            RequestStatusType::Executed | RequestStatusType::ManualNeeded => {
                SiloOutcome::Executed
            }
            _ => SiloOutcome::Failed,
        })),
        Err(e) => {
            causes.push(e);
            JobStatus::Failed
        }
    };

    if let Err(e) = JobTracker::new(context)
        .update_job_status(&execution.job_id, status)
        .await
    {
        error!(error = %e, %status, "Failed to write job status");
        causes.push(e);
    }
    AggregateError::check(causes)?;
    info!(
        request_id = %execution.request_id,
        job_id = %execution.job_id,
        %status,
        "Interrupted request orchestration settled"
    );
    Ok(status)
}
