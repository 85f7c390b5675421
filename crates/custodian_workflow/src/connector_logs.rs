//! Forwarding of connector log lines into tracing and the job log artifact.

use custodian_protocol::LogMessage;
use custodian_storage::LogStore;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawn a task copying every log line until the stream closes.
pub(crate) fn forward(
    mut stream: BoxStream<'static, LogMessage>,
    logs: Arc<dyn LogStore>,
    reference: Option<String>,
    silo_id: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(line) = stream.next().await {
            debug!(silo_id = %silo_id, line = %line.message, "Connector log");
            let Some(reference) = reference.as_deref() else {
                continue;
            };
            let entry = format!("[{}] {}", silo_id, line.message);
            if let Err(e) = logs.append(reference, &entry).await {
                warn!(silo_id = %silo_id, error = %e, "Failed to append connector log line");
            }
        }
    })
}

/// Wait for a forwarder to flush after its session was torn down.
pub(crate) async fn drain(task: JoinHandle<()>) {
    match tokio::time::timeout(DRAIN_TIMEOUT, task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(error = %e, "Connector log forwarder failed"),
        Err(_) => debug!("Connector log stream still open after teardown"),
    }
}
