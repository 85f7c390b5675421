//! The `silo-update-status` signal and stale-signal diagnostics.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Name of the inbound status-change signal channel.
pub const SILO_UPDATE_STATUS: &str = "silo-update-status";

/// Hint that one RequestStatus may have changed on its connector.
///
/// Signals are never authoritative: a coordinator re-checks the connector
/// before any transition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiloUpdateStatus {
    /// RequestStatus the hint is about
    pub request_status_id: String,
    /// Silo the RequestStatus belongs to
    pub silo_definition_id: String,
}

impl SiloUpdateStatus {
    /// Build a signal payload.
    pub fn new(
        request_status_id: impl Into<String>,
        silo_definition_id: impl Into<String>,
    ) -> Self {
        Self {
            request_status_id: request_status_id.into(),
            silo_definition_id: silo_definition_id.into(),
        }
    }
}

/// Why a signal was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum StaleReason {
    /// The store has no RequestStatus with the named id
    #[display("unknown request status")]
    UnknownStatus,
    /// The named RequestStatus is not pending in its coordinator
    #[display("request status not pending")]
    NotPending,
    /// No live coordinator drives the named silo
    #[display("no coordinator for silo")]
    UnknownSilo,
    /// No orchestration is running for the RequestStatus's request
    #[display("no running orchestration")]
    NotRunning,
}

/// Receives signals that named nothing actionable.
///
/// Dropping a stale signal is never an error; the hook exists for
/// diagnostics only.
pub trait StaleSignalHook: Send + Sync {
    /// Called once per dropped signal.
    fn on_stale(&self, signal: &SiloUpdateStatus, reason: StaleReason);
}

impl<F> StaleSignalHook for F
where
    F: Fn(&SiloUpdateStatus, StaleReason) + Send + Sync,
{
    fn on_stale(&self, signal: &SiloUpdateStatus, reason: StaleReason) {
        self(signal, reason)
    }
}

/// Default hook: a debug-level log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogStaleSignals;

impl StaleSignalHook for LogStaleSignals {
    fn on_stale(&self, signal: &SiloUpdateStatus, reason: StaleReason) {
        debug!(
            request_status_id = %signal.request_status_id,
            silo_id = %signal.silo_definition_id,
            %reason,
            "Ignoring stale signal"
        );
    }
}
