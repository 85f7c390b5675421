//! Long-running worker fed newline-delimited JSON commands.

use custodian_error::{CustodianResult, JsonError, WorkflowError, WorkflowErrorKind};
use custodian_workflow::{DiscoverSourcesArgs, Engine, ExecuteRequestArgs, SiloUpdateStatus};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

/// One line of worker input.
///
/// ```json
/// {"type":"execute-request","requestId":"req-1","jobId":"job-1","workspaceId":"ws-1"}
/// {"type":"discover-sources","siloDefinitionId":"silo-1","workspaceId":"ws-1","jobId":"job-2"}
/// {"type":"silo-update-status","requestStatusId":"rs-1","siloDefinitionId":"silo-1"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WorkerCommand {
    /// Start an execution job
    ExecuteRequest(ExecuteRequestArgs),
    /// Start a discovery job
    DiscoverSources(DiscoverSourcesArgs),
    /// Route a signal to a running execution job
    SiloUpdateStatus(SiloUpdateStatus),
}

impl WorkerCommand {
    /// Parse one input line.
    ///
    /// # Errors
    ///
    /// Returns an error if the line is not a known command.
    pub fn parse(line: &str) -> CustodianResult<Self> {
        Ok(serde_json::from_str(line).map_err(JsonError::from)?)
    }
}

/// Counters of one worker run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Getters)]
pub struct WorkerSummary {
    /// Lines that parsed as commands
    accepted: usize,
    /// Lines that did not parse
    rejected: usize,
    /// Signals delivered to a running orchestration
    signals_routed: usize,
    /// Jobs that ended without error
    jobs_succeeded: usize,
    /// Jobs that ended with an error
    jobs_failed: usize,
}

/// Read commands from `input` until end of input, then wait for every
/// started job.
///
/// Execution jobs are started before the next line is read, so a signal
/// following its job on the input always finds the orchestration. Job
/// failures are logged and counted; they do not stop the worker.
///
/// # Errors
///
/// Returns an error only if reading the input fails.
#[instrument(skip_all)]
pub async fn run<R>(engine: Engine, input: R) -> CustodianResult<WorkerSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = WorkerSummary::default();
    let mut jobs: JoinSet<(String, bool)> = JoinSet::new();
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await.map_err(|e| {
        WorkflowError::new(WorkflowErrorKind::InvalidInput(format!(
            "Failed to read input: {}",
            e
        )))
    })? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let command = match WorkerCommand::parse(line) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "Rejected worker input line");
                summary.rejected += 1;
                continue;
            }
        };
        summary.accepted += 1;

        match command {
            WorkerCommand::ExecuteRequest(args) => {
                let job_id = args.job_id.clone();
                match engine.start_request(args).await {
                    Ok(handle) => {
                        jobs.spawn(async move {
                            let outcome = handle.wait().await;
                            (job_id, report("execute-request", outcome))
                        });
                    }
                    Err(e) => {
                        error!(job_id = %job_id, error = %e, "Failed to start execution job");
                        summary.jobs_failed += 1;
                    }
                }
            }
            WorkerCommand::DiscoverSources(args) => {
                let engine = engine.clone();
                let job_id = args.job_id.clone();
                jobs.spawn(async move {
                    let outcome = engine.discover_sources(args).await;
                    (job_id, report("discover-sources", outcome))
                });
            }
            WorkerCommand::SiloUpdateStatus(signal) => match engine.signal(signal).await {
                Ok(true) => summary.signals_routed += 1,
                Ok(false) => debug!("Signal had no running orchestration"),
                Err(e) => warn!(error = %e, "Signal lookup failed"),
            },
        }
    }

    debug!(pending = jobs.len(), "Input closed, waiting for jobs");
    while let Some(joined) = jobs.join_next().await {
        match joined {
            Ok((_, true)) => summary.jobs_succeeded += 1,
            Ok((job_id, false)) => {
                debug!(job_id = %job_id, "Job ended with an error");
                summary.jobs_failed += 1;
            }
            Err(e) => {
                error!(error = %e, "Job task panicked");
                summary.jobs_failed += 1;
            }
        }
    }

    info!(
        accepted = summary.accepted,
        rejected = summary.rejected,
        succeeded = summary.jobs_succeeded,
        failed = summary.jobs_failed,
        "Worker input drained"
    );
    Ok(summary)
}

fn report<T: std::fmt::Display>(kind: &str, outcome: CustodianResult<T>) -> bool {
    match outcome {
        Ok(value) => {
            info!(kind, result = %value, "Job finished");
            true
        }
        Err(e) => {
            error!(kind, error = %e, "Job failed");
            false
        }
    }
}
