//! Scripted in-memory connector for exercising orchestration without a
//! connector process.

use crate::{
    ConnectorFactory, ConnectorSession, DataSourceMatcher, DataType, LogMessage, Phase,
    ProtocolStream, Query, Record, RecordType, RequestHandle, RequestResult,
    RequestStatusMessage, RequestType, RequestsMessage, Schema, SchemasMessage,
};
use async_trait::async_trait;
use custodian_core::SiloSpecification;
use custodian_error::{ConnectorError, ConnectorErrorKind, CustodianResult};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One call observed by a scripted connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorCall {
    /// Session opened
    InitConn,
    /// Catalog fetched
    Schema,
    /// Query started for these entities
    Query(Vec<DataSourceMatcher>),
    /// Delete started for these entities
    Delete(Vec<DataSourceMatcher>),
    /// Status re-checked for these entities
    RequestStatus(Vec<DataSourceMatcher>),
    /// Results extracted for these entities
    RequestResults(Vec<DataSourceMatcher>),
    /// Logs attached
    AttachLogs,
    /// Session released
    Teardown,
}

/// Scripted behaviour of one entity.
#[derive(Debug, Clone)]
pub struct EntityScript {
    phases: Vec<Phase>,
    data_type: DataType,
    records: Vec<serde_json::Value>,
    file: Option<String>,
    omit_from_start: bool,
    omit_from_status: bool,
    cursor: usize,
}

impl EntityScript {
    /// Phases reported by the start call and each following status check.
    /// The last phase repeats once the script is exhausted.
    pub fn new(phases: impl Into<Vec<Phase>>) -> Self {
        Self {
            phases: phases.into(),
            data_type: DataType::None,
            records: Vec::new(),
            file: None,
            omit_from_start: false,
            omit_from_status: false,
            cursor: 0,
        }
    }

    /// Complete immediately at start.
    pub fn complete() -> Self {
        Self::new(vec![Phase::Complete])
    }

    /// Yield these records on extraction.
    pub fn records(mut self, records: Vec<serde_json::Value>) -> Self {
        self.data_type = DataType::Records;
        self.records = records;
        self
    }

    /// Yield a file reference on extraction; `None` yields a file record
    /// without a path.
    pub fn file(mut self, path: Option<&str>) -> Self {
        self.data_type = DataType::File;
        self.file = path.map(str::to_string);
        self
    }

    /// Report this data type without yielding anything on extraction.
    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    /// Leave this entity out of the start response.
    pub fn missing_from_start(mut self) -> Self {
        self.omit_from_start = true;
        self
    }

    /// Leave this entity out of status responses.
    pub fn missing_from_status(mut self) -> Self {
        self.omit_from_status = true;
        self
    }

    fn current_phase(&self) -> Phase {
        let idx = self.cursor.min(self.phases.len().saturating_sub(1));
        self.phases.get(idx).copied().unwrap_or(Phase::Complete)
    }
}

/// Scripted responses of a connector.
#[derive(Debug, Clone, Default)]
pub struct Script {
    catalog: Vec<Schema>,
    entities: HashMap<DataSourceMatcher, EntityScript>,
    init_error: Option<ConnectorErrorKind>,
    schema_error: Option<ConnectorErrorKind>,
    schema_transient_failures: u32,
    status_error: Option<ConnectorErrorKind>,
    results_error: Option<ConnectorErrorKind>,
    results_transient_failures: u32,
    start_exit_code: i64,
    status_exit_code: i64,
    results_exit_code: i64,
    log_lines: Vec<String>,
}

impl Script {
    /// An empty script: empty catalog, zero exit codes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a schema to the catalog with scripted behaviour.
    pub fn entity(mut self, schema: Schema, script: EntityScript) -> Self {
        self.entities.insert(DataSourceMatcher::from(&schema), script);
        self.catalog.push(schema);
        self
    }

    /// Add a schema to the catalog without scripting it.
    pub fn schema(mut self, schema: Schema) -> Self {
        self.catalog.push(schema);
        self
    }

    /// Fail session initialisation.
    pub fn fail_init(mut self, kind: ConnectorErrorKind) -> Self {
        self.init_error = Some(kind);
        self
    }

    /// Fail every catalog fetch.
    pub fn fail_schema(mut self, kind: ConnectorErrorKind) -> Self {
        self.schema_error = Some(kind);
        self
    }

    /// Fail the first `times` catalog fetches with a transport error.
    pub fn flaky_schema(mut self, times: u32) -> Self {
        self.schema_transient_failures = times;
        self
    }

    /// Fail every status call.
    pub fn fail_status(mut self, kind: ConnectorErrorKind) -> Self {
        self.status_error = Some(kind);
        self
    }

    /// Fail every extraction call.
    pub fn fail_results(mut self, kind: ConnectorErrorKind) -> Self {
        self.results_error = Some(kind);
        self
    }

    /// Fail the first `times` extraction calls with a transport error.
    pub fn flaky_results(mut self, times: u32) -> Self {
        self.results_transient_failures = times;
        self
    }

    /// Exit code reported by start calls.
    pub fn start_exit_code(mut self, code: i64) -> Self {
        self.start_exit_code = code;
        self
    }

    /// Exit code reported by status calls.
    pub fn status_exit_code(mut self, code: i64) -> Self {
        self.status_exit_code = code;
        self
    }

    /// Exit code reported by extraction calls.
    pub fn results_exit_code(mut self, code: i64) -> Self {
        self.results_exit_code = code;
        self
    }

    /// Lines emitted on the log stream.
    pub fn logs(mut self, lines: Vec<&str>) -> Self {
        self.log_lines = lines.into_iter().map(str::to_string).collect();
        self
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    script: Script,
    calls: Vec<ConnectorCall>,
    sessions_opened: usize,
    teardowns: usize,
    handle_seq: u64,
}

/// In-memory connector driven by a [`Script`].
///
/// Acts as its own factory; every session shares the script and the call
/// log, so call order is observable across sessions.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedConnector {
    /// Wrap a script.
    pub fn new(script: Script) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                script,
                ..ScriptState::default()
            })),
        }
    }

    /// Every call observed so far.
    pub async fn calls(&self) -> Vec<ConnectorCall> {
        self.state.lock().await.calls.clone()
    }

    /// Number of calls matching a predicate.
    pub async fn count_calls(&self, pred: impl Fn(&ConnectorCall) -> bool) -> usize {
        self.state.lock().await.calls.iter().filter(|c| pred(c)).count()
    }

    /// Sessions created through the factory.
    pub async fn sessions_opened(&self) -> usize {
        self.state.lock().await.sessions_opened
    }

    /// Teardown calls observed.
    pub async fn teardowns(&self) -> usize {
        self.state.lock().await.teardowns
    }

    async fn start(
        &self,
        query: &Query,
        request_type: RequestType,
    ) -> CustodianResult<ProtocolStream<RequestResult>> {
        let mut state = self.state.lock().await;
        let matchers: Vec<DataSourceMatcher> =
            query.identifiers.iter().map(DataSourceMatcher::from).collect();
        state.calls.push(match request_type {
            RequestType::Query => ConnectorCall::Query(matchers.clone()),
            RequestType::Delete => ConnectorCall::Delete(matchers.clone()),
        });

        let mut results = Vec::new();
        for (identifier, matcher) in query.identifiers.iter().zip(matchers) {
            let Some(entity) = state.script.entities.get(&matcher).cloned() else {
                continue;
            };
            if entity.omit_from_start {
                continue;
            }
            state.handle_seq += 1;
            let seq = state.handle_seq;
            results.push(RequestResult {
                status: status_message(&matcher, &entity, request_type),
                handle: RequestHandle {
                    schema_name: identifier.schema_name.clone(),
                    schema_group: identifier.schema_group.clone(),
                    request_type,
                    data: serde_json::json!({ "seq": seq, "query": identifier.identifier_query }),
                },
            });
        }

        Ok(ProtocolStream::ready(results, state.script.start_exit_code))
    }
}

fn status_message(
    matcher: &DataSourceMatcher,
    entity: &EntityScript,
    request_type: RequestType,
) -> RequestStatusMessage {
    let phase = entity.current_phase();
    let data_type = match (phase, request_type) {
        (Phase::Complete, RequestType::Query) => Some(entity.data_type),
        (Phase::Complete, RequestType::Delete) => Some(DataType::None),
        _ => None,
    };
    RequestStatusMessage {
        schema_name: matcher.name().to_string(),
        schema_group: Some(matcher.group().to_string()).filter(|g| !g.is_empty()),
        request_status: phase,
        data_type,
    }
}

fn err(kind: ConnectorErrorKind) -> custodian_error::CustodianError {
    ConnectorError::new(kind).into()
}

#[async_trait]
impl ConnectorSession for ScriptedConnector {
    async fn init_conn(&self) -> CustodianResult<()> {
        let mut state = self.state.lock().await;
        state.calls.push(ConnectorCall::InitConn);
        match state.script.init_error.clone() {
            Some(kind) => Err(err(kind)),
            None => Ok(()),
        }
    }

    async fn schema(&self, _config: &serde_json::Value) -> CustodianResult<SchemasMessage> {
        let mut state = self.state.lock().await;
        state.calls.push(ConnectorCall::Schema);
        if let Some(kind) = state.script.schema_error.clone() {
            return Err(err(kind));
        }
        if state.script.schema_transient_failures > 0 {
            state.script.schema_transient_failures -= 1;
            return Err(err(ConnectorErrorKind::Transport(
                "scripted transient schema failure".to_string(),
            )));
        }
        Ok(SchemasMessage {
            schemas: state.script.catalog.clone(),
        })
    }

    async fn query(
        &self,
        _config: &serde_json::Value,
        query: &Query,
    ) -> CustodianResult<ProtocolStream<RequestResult>> {
        self.start(query, RequestType::Query).await
    }

    async fn delete(
        &self,
        _config: &serde_json::Value,
        query: &Query,
    ) -> CustodianResult<ProtocolStream<RequestResult>> {
        self.start(query, RequestType::Delete).await
    }

    async fn request_status(
        &self,
        _config: &serde_json::Value,
        requests: &RequestsMessage,
    ) -> CustodianResult<ProtocolStream<RequestStatusMessage>> {
        let mut state = self.state.lock().await;
        let matchers: Vec<DataSourceMatcher> =
            requests.handles.iter().map(DataSourceMatcher::from).collect();
        state.calls.push(ConnectorCall::RequestStatus(matchers.clone()));
        if let Some(kind) = state.script.status_error.clone() {
            return Err(err(kind));
        }

        let mut statuses = Vec::new();
        for (handle, matcher) in requests.handles.iter().zip(matchers) {
            let Some(entity) = state.script.entities.get_mut(&matcher) else {
                continue;
            };
            entity.cursor += 1;
            if entity.omit_from_status {
                continue;
            }
            statuses.push(status_message(&matcher, entity, handle.request_type));
        }

        Ok(ProtocolStream::ready(statuses, state.script.status_exit_code))
    }

    async fn request_results(
        &self,
        _config: &serde_json::Value,
        requests: &RequestsMessage,
    ) -> CustodianResult<ProtocolStream<Record>> {
        let mut state = self.state.lock().await;
        let matchers: Vec<DataSourceMatcher> =
            requests.handles.iter().map(DataSourceMatcher::from).collect();
        state.calls.push(ConnectorCall::RequestResults(matchers.clone()));
        if let Some(kind) = state.script.results_error.clone() {
            return Err(err(kind));
        }
        if state.script.results_transient_failures > 0 {
            state.script.results_transient_failures -= 1;
            return Err(err(ConnectorErrorKind::Transport(
                "scripted transient extraction failure".to_string(),
            )));
        }

        let mut records = Vec::new();
        for (handle, matcher) in requests.handles.iter().zip(matchers) {
            if handle.request_type == RequestType::Delete {
                continue;
            }
            let Some(entity) = state.script.entities.get(&matcher) else {
                continue;
            };
            let group = Some(matcher.group().to_string()).filter(|g| !g.is_empty());
            match entity.data_type {
                DataType::Records => {
                    records.extend(entity.records.iter().map(|data| Record {
                        stream: matcher.name().to_string(),
                        schema_group: group.clone(),
                        data: data.clone(),
                        record_type: RecordType::Record,
                        file: None,
                    }));
                }
                DataType::File => records.push(Record {
                    stream: matcher.name().to_string(),
                    schema_group: group,
                    data: serde_json::Value::Null,
                    record_type: RecordType::File,
                    file: entity.file.clone(),
                }),
                DataType::None => {}
            }
        }

        Ok(ProtocolStream::ready(records, state.script.results_exit_code))
    }

    async fn attach_logs(&self) -> CustodianResult<BoxStream<'static, LogMessage>> {
        let mut state = self.state.lock().await;
        state.calls.push(ConnectorCall::AttachLogs);
        let lines: Vec<LogMessage> = state
            .script
            .log_lines
            .iter()
            .map(|message| LogMessage {
                message: message.clone(),
            })
            .collect();
        Ok(futures::stream::iter(lines).boxed())
    }

    async fn teardown(&self) -> CustodianResult<()> {
        let mut state = self.state.lock().await;
        state.calls.push(ConnectorCall::Teardown);
        state.teardowns += 1;
        Ok(())
    }
}

#[async_trait]
impl ConnectorFactory for ScriptedConnector {
    async fn new_session(
        &self,
        _specification: &SiloSpecification,
    ) -> CustodianResult<Arc<dyn ConnectorSession>> {
        self.state.lock().await.sessions_opened += 1;
        Ok(Arc::new(self.clone()))
    }
}

/// Routes sessions to scripted connectors by the specification's image.
#[derive(Debug, Clone, Default)]
pub struct ScriptedFactory {
    connectors: HashMap<String, ScriptedConnector>,
}

impl ScriptedFactory {
    /// An empty routing table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve sessions for `image` from `connector`.
    pub fn register(mut self, image: impl Into<String>, connector: ScriptedConnector) -> Self {
        self.connectors.insert(image.into(), connector);
        self
    }
}

#[async_trait]
impl ConnectorFactory for ScriptedFactory {
    async fn new_session(
        &self,
        specification: &SiloSpecification,
    ) -> CustodianResult<Arc<dyn ConnectorSession>> {
        match self.connectors.get(specification.image()) {
            Some(connector) => connector.new_session(specification).await,
            None => Err(err(ConnectorErrorKind::SessionUnavailable(format!(
                "no connector registered for image {}",
                specification.image()
            )))),
        }
    }
}
