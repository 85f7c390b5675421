//! Silo Request Coordinator.
//!
//! One actor per silo. It owns the silo's connector session and drives
//! every RequestStatus of the silo through
//! `Start -> {ManualPending | Polling | Extracting} -> Terminal`:
//!
//! - **Start** loads the silo's statuses, opens the session, fetches the
//!   schema catalog once and submits every identifier in one start call.
//! - **Polling** re-checks pending items when the poll timer fires or a
//!   signal names one of them, whichever comes first.
//! - **Extracting** fetches payloads of completed items in one batch.
//!
//! Every transition is written to the store as soon as it is known. When
//! nothing is pending the coordinator tears its session down and reports a
//! [`SiloReport`]; the owner decides when to stop it.

use crate::store_ops::StoreOps;
use crate::{
    RequestOperation, SiloUpdateStatus, StaleReason, WorkflowContext, activity, connector_logs,
};
use custodian_core::{
    QueryResult, Request, RequestStatus, RequestStatusType, SecretString, SiloDefinition,
    SiloOutcome,
};
use custodian_error::{
    ConnectorError, ConnectorErrorKind, CustodianError, CustodianResult, WorkflowError,
    WorkflowErrorKind,
};
use custodian_protocol::{
    ConnectorSession, DataSourceMatcher, DataType, Phase, Query, QueryIdentifier, Record,
    RecordType, RequestHandle, RequestResult, RequestStatusMessage, RequestsMessage,
    SchemasMessage, build_identifier, find_schema,
};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

/// Completion report of one coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiloReport {
    /// Silo the coordinator drove
    pub silo_id: String,
    /// Silo exit status
    pub outcome: SiloOutcome,
    /// Items that ended `Executed` or `ManualNeeded`
    pub succeeded: usize,
    /// Items that ended `Failed`
    pub failed: usize,
}

/// Delivers a coordinator's report to its owner.
pub type ReportFn = Arc<dyn Fn(SiloReport) + Send + Sync>;

/// Messages handled by a [`SiloCoordinator`].
#[derive(Debug, Clone)]
pub enum CoordinatorMessage {
    /// A status-change hint from outside
    Signal(SiloUpdateStatus),
    /// The poll timer armed as `generation` fired
    PollTimer {
        /// Generation the timer was armed with
        generation: u64,
    },
}

/// Startup arguments of a [`SiloCoordinator`].
pub struct CoordinatorArgs {
    /// Shared collaborators
    pub context: WorkflowContext,
    /// Request being executed
    pub request: Request,
    /// Silo to drive
    pub silo: SiloDefinition,
    /// Job log artifact receiving connector logs
    pub log_object: Option<String>,
    /// Completion callback
    pub report: ReportFn,
}

/// Actor driving one silo of one request.
#[derive(Debug, Clone, Copy, Default)]
pub struct SiloCoordinator;

#[derive(Debug, Clone)]
struct Pending {
    status_id: String,
    matcher: DataSourceMatcher,
    handle: RequestHandle,
}

type Completed = Vec<(Pending, Option<DataType>)>;

enum Prepared {
    Start {
        status_id: String,
        matcher: DataSourceMatcher,
        identifier: QueryIdentifier,
    },
    Resume(Pending),
}

/// Runtime state of a [`SiloCoordinator`].
pub struct CoordinatorState {
    context: WorkflowContext,
    ops: StoreOps,
    request: Request,
    silo: SiloDefinition,
    log_object: Option<String>,
    report: ReportFn,
    session: Option<Arc<dyn ConnectorSession>>,
    log_task: Option<JoinHandle<()>>,
    config: serde_json::Value,
    pending: BTreeMap<String, Pending>,
    succeeded: usize,
    failed: usize,
    bootstrap_failed: bool,
    finished: bool,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl CoordinatorState {
    fn new(args: CoordinatorArgs) -> Self {
        let ops = StoreOps::new(
            args.context.store().clone(),
            args.context.config().coordinator_retry().clone(),
        );
        Self {
            context: args.context,
            ops,
            request: args.request,
            silo: args.silo,
            log_object: args.log_object,
            report: args.report,
            session: None,
            log_task: None,
            config: serde_json::Value::Null,
            pending: BTreeMap::new(),
            succeeded: 0,
            failed: 0,
            bootstrap_failed: false,
            finished: false,
            generation: 0,
            timer: None,
        }
    }

    fn silo_id(&self) -> &str {
        self.silo.id()
    }

    /// Write a terminal status and count it.
    async fn record(&mut self, status_id: &str, status: RequestStatusType) {
        self.pending.remove(status_id);
        let landed = self.ops.set_status_logged(status_id, status).await;
        if landed && status != RequestStatusType::Failed {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    async fn fail_item(&mut self, status_id: &str, reason: &CustodianError) {
        warn!(
            silo_id = %self.silo_id(),
            request_status_id = status_id,
            error = %reason,
            "Request status failed"
        );
        self.record(status_id, RequestStatusType::Failed).await;
    }

    /// Force every listed item to `Failed` and fail the silo, keeping
    /// whatever already succeeded.
    async fn fail_silo(&mut self, status_ids: Vec<String>, reason: CustodianError) {
        let err = WorkflowError::new(WorkflowErrorKind::SiloBootstrap {
            silo_id: self.silo_id().to_string(),
            reason: reason.to_string(),
        });
        error!(error = %err, items = status_ids.len(), "Failing every pending item of silo");
        self.bootstrap_failed = true;
        for id in status_ids {
            self.record(&id, RequestStatusType::Failed).await;
        }
    }

    #[instrument(skip(self), fields(silo_id = %self.silo.id(), request_id = %self.request.id))]
    async fn bootstrap(&mut self) {
        let statuses = match self
            .ops
            .statuses_for_silo(&self.request.id, self.silo.id())
            .await
        {
            Ok(statuses) => statuses,
            Err(e) => {
                error!(error = %e, "Failed to load request statuses");
                self.bootstrap_failed = true;
                return;
            }
        };

        let mut open = Vec::new();
        for status in statuses {
            match status.status {
                RequestStatusType::Executed | RequestStatusType::ManualNeeded => {
                    self.succeeded += 1
                }
                RequestStatusType::Failed => self.failed += 1,
                RequestStatusType::Created | RequestStatusType::InProgress => open.push(status),
            }
        }
        if open.is_empty() {
            debug!("No open request statuses");
            return;
        }

        if *self.silo.specification().manual() {
            info!(items = open.len(), "Manual silo, marking items for manual action");
            for status in &open {
                self.record(&status.id, RequestStatusType::ManualNeeded)
                    .await;
            }
            return;
        }

        let (keyed, unkeyed): (Vec<RequestStatus>, Vec<RequestStatus>) =
            open.into_iter().partition(|status| {
                self.silo
                    .data_source(&status.data_source_id)
                    .and_then(|ds| ds.primary_key_property())
                    .is_some()
            });

        if keyed.is_empty() {
            debug!(items = unkeyed.len(), "No primary key bearing data sources");
            for status in &unkeyed {
                self.record(&status.id, RequestStatusType::Executed).await;
            }
            return;
        }

        let catalog = match self.open_session().await {
            Ok(catalog) => catalog,
            Err(e) => {
                let ids = keyed.iter().chain(&unkeyed).map(|s| s.id.clone()).collect();
                self.fail_silo(ids, e).await;
                return;
            }
        };

        for status in &unkeyed {
            self.record(&status.id, RequestStatusType::Executed).await;
        }

        let mut fresh = Vec::new();
        let mut resumed = Vec::new();
        for status in &keyed {
            match self.prepare(status, &catalog) {
                Ok(Prepared::Start {
                    status_id,
                    matcher,
                    identifier,
                }) => fresh.push((status_id, matcher, identifier)),
                Ok(Prepared::Resume(pending)) => resumed.push(pending),
                Err(e) => self.fail_item(&status.id, &e).await,
            }
        }

        let mut completed = Completed::new();
        if !fresh.is_empty() {
            let query = Query {
                identifiers: fresh.iter().map(|(_, _, id)| id.clone()).collect(),
            };
            let started: CustodianResult<Vec<RequestResult>> = match self.start(&query).await {
                Ok((results, 0)) => Ok(results),
                Ok((_, code)) => {
                    Err(ConnectorError::new(ConnectorErrorKind::NonZeroExit(code)).into())
                }
                Err(e) => Err(e),
            };
            let results = match started {
                Ok(results) => results,
                Err(e) => {
                    let ids = fresh
                        .iter()
                        .map(|(id, _, _)| id.clone())
                        .chain(resumed.iter().map(|p| p.status_id.clone()))
                        .collect();
                    self.fail_silo(ids, e).await;
                    return;
                }
            };

            let by_matcher: HashMap<DataSourceMatcher, RequestResult> = results
                .into_iter()
                .map(|result| (DataSourceMatcher::from(&result.handle), result))
                .collect();

            for (status_id, matcher, _) in fresh {
                let Some(result) = by_matcher.get(&matcher) else {
                    let e = ConnectorError::new(ConnectorErrorKind::Protocol(format!(
                        "start response has no entry for {}",
                        matcher
                    )));
                    self.fail_item(&status_id, &e.into()).await;
                    continue;
                };
                if let Err(e) = self.persist_handle(&status_id, &result.handle).await {
                    self.fail_item(&status_id, &e).await;
                    continue;
                }
                let pending = Pending {
                    status_id,
                    matcher,
                    handle: result.handle.clone(),
                };
                self.route(pending, &result.status, &mut completed).await;
            }
        }

        self.extract(completed).await;

        if !resumed.is_empty() {
            info!(items = resumed.len(), "Resuming in-progress items");
            for pending in resumed {
                self.pending.insert(pending.status_id.clone(), pending);
            }
            self.check_pending().await;
        }
    }

    /// Open the session, attach logs and fetch the schema catalog.
    async fn open_session(&mut self) -> CustodianResult<SchemasMessage> {
        let policy = self.ops.policy().clone();
        let connectors = self.context.connectors().clone();
        let specification = self.silo.specification().clone();

        let session = activity::execute(&policy, "new_session", || {
            connectors.new_session(&specification)
        })
        .await?;
        self.session = Some(session.clone());

        activity::execute(&policy, "init_conn", || session.init_conn()).await?;

        match session.attach_logs().await {
            Ok(stream) => {
                self.log_task = Some(connector_logs::forward(
                    stream,
                    self.context.logs().clone(),
                    self.log_object.clone(),
                    self.silo_id().to_string(),
                ));
            }
            Err(e) => warn!(
                silo_id = %self.silo_id(),
                error = %e,
                "Failed to attach connector logs"
            ),
        }

        self.config = self.silo.config_json().map_err(|e| {
            ConnectorError::new(ConnectorErrorKind::InvalidConfig(e.to_string()))
        })?;

        let config = &self.config;
        let catalog = activity::execute(&policy, "schema", || session.schema(config)).await?;
        debug!(
            silo_id = %self.silo_id(),
            schemas = catalog.schemas.len(),
            "Fetched schema catalog"
        );
        Ok(catalog)
    }

    /// Decide whether an item is started fresh or resumed from its handle.
    fn prepare(
        &self,
        status: &RequestStatus,
        catalog: &SchemasMessage,
    ) -> CustodianResult<Prepared> {
        let data_source = self.silo.data_source(&status.data_source_id).ok_or_else(|| {
            ConnectorError::new(ConnectorErrorKind::SchemaNotFound(status.data_source_id.clone()))
        })?;
        let matcher = DataSourceMatcher::from(data_source);

        if let (RequestStatusType::InProgress, Some(handle)) = (status.status, &status.handle) {
            let handle: RequestHandle = serde_json::from_str(handle.expose()).map_err(|e| {
                ConnectorError::new(ConnectorErrorKind::Protocol(format!(
                    "unreadable handle for {}: {}",
                    status.id, e
                )))
            })?;
            return Ok(Prepared::Resume(Pending {
                status_id: status.id.clone(),
                matcher,
                handle,
            }));
        }

        let property = data_source.primary_key_property().ok_or_else(|| {
            ConnectorError::new(ConnectorErrorKind::MissingPrimaryKey(data_source.name().clone()))
        })?;
        let schema = find_schema(catalog, data_source).ok_or_else(|| {
            ConnectorError::new(ConnectorErrorKind::SchemaNotFound(matcher.to_string()))
        })?;
        let value = property
            .user_primary_key_id()
            .as_deref()
            .and_then(|key_id| self.request.primary_key_value(key_id))
            .ok_or_else(|| {
                ConnectorError::new(ConnectorErrorKind::MissingPrimaryKey(property.name().clone()))
            })?;

        Ok(Prepared::Start {
            status_id: status.id.clone(),
            matcher,
            identifier: build_identifier(schema, property.name(), value),
        })
    }

    fn session(&self) -> CustodianResult<Arc<dyn ConnectorSession>> {
        self.session.clone().ok_or_else(|| {
            ConnectorError::new(ConnectorErrorKind::SessionUnavailable(
                "session already released".to_string(),
            ))
            .into()
        })
    }

    async fn start(&self, query: &Query) -> CustodianResult<(Vec<RequestResult>, i64)> {
        let session = self.session()?;
        let config = &self.config;
        let kind = self.request.kind;
        info!(
            silo_id = %self.silo_id(),
            %kind,
            identifiers = query.identifiers.len(),
            "Starting connector operations"
        );
        activity::execute(self.ops.policy(), "start", || {
            let session = session.clone();
            async move {
                let stream = kind.start(session.as_ref(), config, query).await?;
                Ok::<_, CustodianError>(stream.collect().await)
            }
        })
        .await
    }

    async fn persist_handle(&self, status_id: &str, handle: &RequestHandle) -> CustodianResult<()> {
        let sealed = serde_json::to_string(handle).map_err(custodian_error::JsonError::from)?;
        self.ops
            .set_status(
                status_id,
                RequestStatusType::InProgress,
                Some(SecretString::new(sealed)),
            )
            .await?;
        Ok(())
    }

    /// Branch on a connector-reported phase.
    async fn route(
        &mut self,
        pending: Pending,
        report: &RequestStatusMessage,
        completed: &mut Completed,
    ) {
        match report.request_status {
            Phase::Complete => completed.push((pending, report.data_type)),
            Phase::Failed => {
                info!(
                    silo_id = %self.silo_id(),
                    request_status_id = %pending.status_id,
                    "Connector reported operation failure"
                );
                self.record(&pending.status_id, RequestStatusType::Failed)
                    .await;
            }
            Phase::Progress => {
                self.pending.insert(pending.status_id.clone(), pending);
            }
        }
    }

    /// Re-check every pending item by replaying its handle.
    #[instrument(skip(self), fields(silo_id = %self.silo.id(), pending = self.pending.len()))]
    async fn check_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch: Vec<Pending> = std::mem::take(&mut self.pending).into_values().collect();
        let requests = RequestsMessage {
            handles: batch.iter().map(|p| p.handle.clone()).collect(),
        };

        let reports = match self.status_call(&requests).await {
            Ok((reports, 0)) => reports,
            Ok((_, code)) => {
                let e: CustodianError =
                    ConnectorError::new(ConnectorErrorKind::NonZeroExit(code)).into();
                for pending in batch {
                    self.fail_item(&pending.status_id, &e).await;
                }
                return;
            }
            Err(e) => {
                for pending in batch {
                    self.fail_item(&pending.status_id, &e).await;
                }
                return;
            }
        };

        let by_matcher: HashMap<DataSourceMatcher, RequestStatusMessage> = reports
            .into_iter()
            .map(|report| (DataSourceMatcher::from(&report), report))
            .collect();

        let mut completed = Completed::new();
        for pending in batch {
            match by_matcher.get(&pending.matcher) {
                Some(report) => self.route(pending, report, &mut completed).await,
                None => {
                    let e = ConnectorError::new(ConnectorErrorKind::Protocol(format!(
                        "status response has no entry for {}",
                        pending.matcher
                    )));
                    self.fail_item(&pending.status_id, &e.into()).await;
                }
            }
        }
        self.extract(completed).await;
    }

    async fn status_call(
        &self,
        requests: &RequestsMessage,
    ) -> CustodianResult<(Vec<RequestStatusMessage>, i64)> {
        let session = self.session()?;
        let config = &self.config;
        activity::execute(self.ops.policy(), "request_status", || {
            let session = session.clone();
            async move {
                let stream = session.request_status(config, requests).await?;
                Ok::<_, CustodianError>(stream.collect().await)
            }
        })
        .await
    }

    /// Move completed items to a terminal status, extracting payloads
    /// where the request kind has one.
    async fn extract(&mut self, completed: Completed) {
        if completed.is_empty() {
            return;
        }
        let kind = self.request.kind;
        let (fetch, settled): (Completed, Completed) = completed
            .into_iter()
            .partition(|(_, data_type)| kind.needs_extraction(*data_type));

        for (pending, _) in settled {
            self.record(&pending.status_id, RequestStatusType::Executed)
                .await;
        }
        if fetch.is_empty() {
            return;
        }

        match self.extract_results(&fetch).await {
            Ok(results) => {
                for ((pending, _), result) in fetch.into_iter().zip(results) {
                    match self.ops.save_result(result).await {
                        Ok(saved) => {
                            debug!(
                                request_status_id = %pending.status_id,
                                result_type = %saved.result_type,
                                "Stored query result"
                            );
                            self.record(&pending.status_id, RequestStatusType::Executed)
                                .await;
                        }
                        Err(e) => self.fail_item(&pending.status_id, &e).await,
                    }
                }
            }
            Err(e) => {
                error!(
                    silo_id = %self.silo_id(),
                    items = fetch.len(),
                    error = %e,
                    "Extraction failed"
                );
                for (pending, _) in fetch {
                    self.record(&pending.status_id, RequestStatusType::Failed)
                        .await;
                }
            }
        }
    }

    /// One extraction call for the whole batch; any malformed payload
    /// fails the batch.
    async fn extract_results(
        &self,
        fetch: &[(Pending, Option<DataType>)],
    ) -> CustodianResult<Vec<QueryResult>> {
        let session = self.session()?;
        let config = &self.config;
        let requests = RequestsMessage {
            handles: fetch.iter().map(|(p, _)| p.handle.clone()).collect(),
        };
        let requests = &requests;

        let (records, code) = activity::execute(self.ops.policy(), "request_results", || {
            let session = session.clone();
            async move {
                let stream = session.request_results(config, requests).await?;
                Ok::<_, CustodianError>(stream.collect().await)
            }
        })
        .await?;
        if code != 0 {
            return Err(ConnectorError::new(ConnectorErrorKind::NonZeroExit(code)).into());
        }

        let wanted: HashSet<&DataSourceMatcher> = fetch.iter().map(|(p, _)| &p.matcher).collect();
        let mut grouped: HashMap<DataSourceMatcher, Vec<Record>> = HashMap::new();
        for record in records {
            let matcher = DataSourceMatcher::from(&record);
            if !wanted.contains(&matcher) {
                warn!(
                    silo_id = %self.silo_id(),
                    schema = %matcher,
                    "Ignoring record for unknown schema"
                );
                continue;
            }
            grouped.entry(matcher).or_default().push(record);
        }

        fetch
            .iter()
            .map(|(pending, data_type)| {
                let records = grouped.remove(&pending.matcher).unwrap_or_default();
                build_result(&pending.status_id, *data_type, records)
            })
            .collect()
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation += 1;
    }

    fn arm_timer(&mut self, myself: &ActorRef<CoordinatorMessage>) {
        self.cancel_timer();
        let generation = self.generation;
        let interval = self.context.config().poll_interval();
        let myself = myself.clone();
        self.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            if let Err(e) = myself.send_message(CoordinatorMessage::PollTimer { generation }) {
                debug!(error = ?e, "Coordinator gone before poll timer fired");
            }
        }));
    }

    /// Finish when nothing is pending, otherwise wait for the next wake-up.
    async fn settle(&mut self, myself: &ActorRef<CoordinatorMessage>) {
        if self.pending.is_empty() {
            self.finish().await;
        } else {
            debug!(
                silo_id = %self.silo_id(),
                pending = self.pending.len(),
                "Waiting for next status check"
            );
            self.arm_timer(myself);
        }
    }

    async fn release_session(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.teardown().await {
                warn!(silo_id = %self.silo_id(), error = %e, "Connector teardown failed");
            }
        }
        if let Some(task) = self.log_task.take() {
            connector_logs::drain(task).await;
        }
    }

    async fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.cancel_timer();
        self.release_session().await;

        // Items settled before the silo failed still count as successes.
        let outcome = if self.bootstrap_failed && self.succeeded == 0 {
            SiloOutcome::Failed
        } else {
            SiloOutcome::from_counts(self.succeeded, self.failed)
        };
        info!(
            silo_id = %self.silo_id(),
            %outcome,
            succeeded = self.succeeded,
            failed = self.failed,
            "Silo finished"
        );
        (self.report)(SiloReport {
            silo_id: self.silo_id().to_string(),
            outcome,
            succeeded: self.succeeded,
            failed: self.failed,
        });
    }
}

/// Shape one item's extracted records into its QueryResult.
fn build_result(
    status_id: &str,
    data_type: Option<DataType>,
    records: Vec<Record>,
) -> CustodianResult<QueryResult> {
    let id = format!("{}-result", status_id);
    match data_type {
        Some(DataType::File) => {
            let path = records
                .into_iter()
                .find(|r| r.record_type == RecordType::File)
                .and_then(|r| r.file)
                .ok_or_else(|| {
                    ConnectorError::new(ConnectorErrorKind::MalformedPayload(format!(
                        "no file reference for {}",
                        status_id
                    )))
                })?;
            Ok(QueryResult::file(id, status_id, path))
        }
        _ => {
            let data: Vec<serde_json::Value> = records
                .into_iter()
                .filter(|r| r.record_type == RecordType::Record)
                .map(|r| r.data)
                .collect();
            Ok(QueryResult::records(id, status_id, &data))
        }
    }
}

#[async_trait::async_trait]
impl Actor for SiloCoordinator {
    type Msg = CoordinatorMessage;
    type State = CoordinatorState;
    type Arguments = CoordinatorArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: CoordinatorArgs,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!(
            silo_id = %args.silo.id(),
            request_id = %args.request.id,
            kind = %args.request.kind,
            "Silo coordinator starting"
        );
        Ok(CoordinatorState::new(args))
    }

    async fn post_start(
        &self,
        myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.bootstrap().await;
        state.settle(&myself).await;
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
            CoordinatorMessage::Signal(signal) => {
                if !state.pending.contains_key(&signal.request_status_id) {
                    state
                        .context
                        .stale_signal_hook()
                        .on_stale(&signal, StaleReason::NotPending);
                    return Ok(());
                }
                debug!(
                    request_status_id = %signal.request_status_id,
                    "Signal triggered status check"
                );
                state.cancel_timer();
                state.check_pending().await;
            }
            CoordinatorMessage::PollTimer { generation } => {
                if generation != state.generation {
                    debug!(
                        generation,
                        current = state.generation,
                        "Ignoring superseded poll timer"
                    );
                    return Ok(());
                }
                state.timer = None;
                debug!("Poll timer triggered status check");
                state.check_pending().await;
            }
        }
        state.settle(&myself).await;
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.cancel_timer();
        state.release_session().await;
        debug!(silo_id = %state.silo_id(), "Silo coordinator stopped");
        Ok(())
    }
}
