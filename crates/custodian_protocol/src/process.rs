//! Connector sessions backed by a local executable.
//!
//! The executable speaks the connector runner command line and writes one
//! JSON [`ConnectorMessage`] per stdout line. Its exit code is the session
//! exit code.

use crate::{
    ConnectorFactory, ConnectorMessage, ConnectorSession, LogMessage, MessageType,
    ProtocolStream, Query, Record, RequestResult, RequestStatusMessage, RequestsMessage,
    SchemasMessage,
};
use async_trait::async_trait;
use custodian_core::SiloSpecification;
use custodian_error::{ConnectorError, ConnectorErrorKind, CustodianError, CustodianResult};
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};
use tracing::{debug, instrument, warn};

const CHANNEL_CAPACITY: usize = 64;

/// Creates [`CommandSession`]s that run the specification's image as a
/// local program.
#[derive(Debug, Clone, Default)]
pub struct CommandConnectorFactory {
    work_root: Option<PathBuf>,
}

impl CommandConnectorFactory {
    /// Sessions get temporary working directories under the system default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions get temporary working directories under `work_root`.
    pub fn with_work_root(work_root: impl Into<PathBuf>) -> Self {
        Self {
            work_root: Some(work_root.into()),
        }
    }
}

#[async_trait]
impl ConnectorFactory for CommandConnectorFactory {
    async fn new_session(
        &self,
        specification: &SiloSpecification,
    ) -> CustodianResult<Arc<dyn ConnectorSession>> {
        Ok(Arc::new(CommandSession::new(
            PathBuf::from(specification.image()),
            self.work_root.clone(),
        )))
    }
}

/// One session of a local connector program.
#[derive(Debug)]
pub struct CommandSession {
    program: PathBuf,
    work_root: Option<PathBuf>,
    work_dir: Mutex<Option<tempfile::TempDir>>,
    log_tx: Arc<Mutex<Option<mpsc::UnboundedSender<LogMessage>>>>,
}

fn transport(message: impl Into<String>) -> CustodianError {
    ConnectorError::new(ConnectorErrorKind::Transport(message.into())).into()
}

fn session_unavailable(message: impl Into<String>) -> CustodianError {
    ConnectorError::new(ConnectorErrorKind::SessionUnavailable(message.into())).into()
}

impl CommandSession {
    fn new(program: PathBuf, work_root: Option<PathBuf>) -> Self {
        Self {
            program,
            work_root,
            work_dir: Mutex::new(None),
            log_tx: Arc::new(Mutex::new(None)),
        }
    }

    /// Working directory of the session, if initialised.
    pub async fn work_dir(&self) -> Option<PathBuf> {
        self.work_dir
            .lock()
            .await
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
    }

    async fn require_work_dir(&self) -> CustodianResult<PathBuf> {
        self.work_dir()
            .await
            .ok_or_else(|| session_unavailable("session used before init_conn"))
    }

    async fn write_arg(
        dir: &Path,
        name: &str,
        value: &impl serde::Serialize,
    ) -> CustodianResult<PathBuf> {
        let path = dir.join(name);
        let body = serde_json::to_vec(value).map_err(custodian_error::JsonError::from)?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| transport(format!("failed to write {}: {}", path.display(), e)))?;
        Ok(path)
    }

    /// Run the program and stream every message of type `want`.
    #[instrument(skip(self, args, extract), fields(program = %self.program.display()))]
    async fn run<T, F>(
        &self,
        args: Vec<String>,
        want: MessageType,
        extract: F,
    ) -> CustodianResult<ProtocolStream<T>>
    where
        T: Send + 'static,
        F: Fn(ConnectorMessage) -> Option<T> + Send + 'static,
    {
        let work_dir = self.require_work_dir().await?;
        let mut child = Command::new(&self.program)
            .args(&args)
            .current_dir(&work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| session_unavailable(format!("failed to spawn connector: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| transport("connector stdout was not captured"))?;

        let (item_tx, item_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (exit_tx, exit_rx) = oneshot::channel();
        let log_tx = Arc::clone(&self.log_tx);

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            let mut abandoned = false;
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) if line.trim().is_empty() => continue,
                    Ok(Some(line)) => match serde_json::from_str::<ConnectorMessage>(&line) {
                        Ok(msg) if msg.kind == MessageType::Log => {
                            if let Some(log) = msg.log {
                                debug!(target: "custodian::connector", message = %log.message);
                                if let Some(tx) = log_tx.lock().await.as_ref() {
                                    let _ = tx.send(log);
                                }
                            }
                        }
                        Ok(msg) if msg.kind == want => {
                            if let Some(item) = extract(msg)
                                && item_tx.send(item).await.is_err()
                            {
                                abandoned = true;
                                break;
                            }
                        }
                        Ok(msg) => {
                            debug!(kind = %msg.kind, "Ignoring unexpected connector message")
                        }
                        Err(e) => warn!(error = %e, "Skipping unparseable connector output line"),
                    },
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Failed reading connector output");
                        break;
                    }
                }
            }
            drop(item_tx);
            // The child may block writing to a pipe nobody reads any more.
            drop(lines);
            if abandoned {
                debug!("Connector output abandoned, stopping connector process");
                if let Err(e) = child.start_kill() {
                    debug!(error = %e, "Connector process already exited");
                }
            }

            let code = match child.wait().await {
                Ok(status) => status.code().map(i64::from).unwrap_or(-1),
                Err(e) => {
                    warn!(error = %e, "Failed waiting for connector process");
                    -1
                }
            };
            let _ = exit_tx.send(code);
        });

        Ok(ProtocolStream {
            items: ReceiverStream::new(item_rx).boxed(),
            exit_code: exit_rx.map(|code| code.unwrap_or(-1)).boxed(),
        })
    }

    async fn start(
        &self,
        verb: &str,
        config: &serde_json::Value,
        query: &Query,
    ) -> CustodianResult<ProtocolStream<RequestResult>> {
        let dir = self.require_work_dir().await?;
        let conf = Self::write_arg(&dir, "conf.json", config).await?;
        let query_path = Self::write_arg(&dir, "query.json", query).await?;
        let persist = dir.join("persist");
        self.run(
            vec![
                verb.to_string(),
                "-c".to_string(),
                conf.display().to_string(),
                "-p".to_string(),
                persist.display().to_string(),
                "-q".to_string(),
                query_path.display().to_string(),
            ],
            MessageType::RequestResult,
            |msg| msg.request,
        )
        .await
    }

    async fn replay<T, F>(
        &self,
        verb: &str,
        config: &serde_json::Value,
        requests: &RequestsMessage,
        want: MessageType,
        extract: F,
    ) -> CustodianResult<ProtocolStream<T>>
    where
        T: Send + 'static,
        F: Fn(ConnectorMessage) -> Option<T> + Send + 'static,
    {
        let dir = self.require_work_dir().await?;
        let conf = Self::write_arg(&dir, "conf.json", config).await?;
        let reqs = Self::write_arg(&dir, "requests.json", requests).await?;
        let persist = dir.join("persist");
        self.run(
            vec![
                verb.to_string(),
                "-c".to_string(),
                conf.display().to_string(),
                "-p".to_string(),
                persist.display().to_string(),
                "-r".to_string(),
                reqs.display().to_string(),
            ],
            want,
            extract,
        )
        .await
    }
}

#[async_trait]
impl ConnectorSession for CommandSession {
    async fn init_conn(&self) -> CustodianResult<()> {
        let mut guard = self.work_dir.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let dir = match &self.work_root {
            Some(root) => tempfile::Builder::new().prefix("custodian-").tempdir_in(root),
            None => tempfile::Builder::new().prefix("custodian-").tempdir(),
        }
        .map_err(|e| session_unavailable(format!("failed to create work dir: {}", e)))?;
        tokio::fs::create_dir_all(dir.path().join("persist"))
            .await
            .map_err(|e| session_unavailable(format!("failed to create persist dir: {}", e)))?;
        debug!(work_dir = %dir.path().display(), "Connector session initialised");
        *guard = Some(dir);
        Ok(())
    }

    async fn schema(&self, config: &serde_json::Value) -> CustodianResult<SchemasMessage> {
        let dir = self.require_work_dir().await?;
        let conf = Self::write_arg(&dir, "conf.json", config).await?;
        let stream = self
            .run(
                vec!["schema".to_string(), "-c".to_string(), conf.display().to_string()],
                MessageType::Schema,
                |msg| msg.schema_msg,
            )
            .await?;
        let (mut catalogs, exit_code) = stream.collect().await;
        if exit_code != 0 {
            return Err(ConnectorError::new(ConnectorErrorKind::NonZeroExit(exit_code)).into());
        }
        catalogs.pop().ok_or_else(|| {
            ConnectorError::new(ConnectorErrorKind::Protocol(
                "connector produced no schema message".to_string(),
            ))
            .into()
        })
    }

    async fn query(
        &self,
        config: &serde_json::Value,
        query: &Query,
    ) -> CustodianResult<ProtocolStream<RequestResult>> {
        self.start("query", config, query).await
    }

    async fn delete(
        &self,
        config: &serde_json::Value,
        query: &Query,
    ) -> CustodianResult<ProtocolStream<RequestResult>> {
        self.start("delete", config, query).await
    }

    async fn request_status(
        &self,
        config: &serde_json::Value,
        requests: &RequestsMessage,
    ) -> CustodianResult<ProtocolStream<RequestStatusMessage>> {
        self.replay(
            "request-status",
            config,
            requests,
            MessageType::RequestStatus,
            |msg| msg.request_status,
        )
        .await
    }

    async fn request_results(
        &self,
        config: &serde_json::Value,
        requests: &RequestsMessage,
    ) -> CustodianResult<ProtocolStream<Record>> {
        self.replay(
            "request-results",
            config,
            requests,
            MessageType::Record,
            |msg| msg.record,
        )
        .await
    }

    async fn attach_logs(&self) -> CustodianResult<BoxStream<'static, LogMessage>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.log_tx.lock().await = Some(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn teardown(&self) -> CustodianResult<()> {
        self.log_tx.lock().await.take();
        if let Some(dir) = self.work_dir.lock().await.take() {
            let path = dir.path().to_path_buf();
            dir.close()
                .map_err(|e| transport(format!("failed to remove {}: {}", path.display(), e)))?;
            debug!(work_dir = %path.display(), "Connector session torn down");
        }
        Ok(())
    }
}
