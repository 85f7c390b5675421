//! Execution of external steps with bounded retry.

use crate::RetryPolicy;
use custodian_error::CustodianResult;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_retry2::strategy::{ExponentialBackoff, jitter};
use tokio_retry2::{Retry, RetryError};
use tracing::{debug, warn};

/// Run one external step (a connector call or a store write) under `policy`.
///
/// Retryable errors are retried with jittered exponential backoff until
/// `max_attempts` is spent; other errors fail immediately. The last error
/// is returned on exhaustion.
pub async fn execute<T, F, Fut>(policy: &RetryPolicy, name: &str, mut op: F) -> CustodianResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CustodianResult<T>>,
{
    let retries = policy.max_attempts().saturating_sub(1) as usize;
    let strategy = ExponentialBackoff::from_millis(*policy.initial_backoff_ms())
        .factor(2)
        .max_delay(Duration::from_secs(*policy.max_delay_secs()))
        .map(jitter)
        .take(retries);

    let attempt = AtomicU32::new(0);
    let result = Retry::spawn(strategy, || {
        let n = attempt.fetch_add(1, Ordering::SeqCst) + 1;
        let fut = op();
        async move {
            match fut.await {
                Ok(value) => Ok(value),
                Err(e) if e.is_retryable() => {
                    warn!(activity = name, attempt = n, error = %e, "Activity failed, will retry");
                    Err(RetryError::Transient {
                        err: e,
                        retry_after: None,
                    })
                }
                Err(e) => {
                    warn!(activity = name, attempt = n, error = %e, "Activity failed permanently");
                    Err(RetryError::Permanent(e))
                }
            }
        }
    })
    .await;

    if result.is_ok() {
        debug!(
            activity = name,
            attempts = attempt.load(Ordering::SeqCst),
            "Activity succeeded"
        );
    }
    result
}
