//! Result streams returned by connector operations.

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};

/// Items streamed back by a connector call, plus the session exit code
/// that resolves once the stream is exhausted.
pub struct ProtocolStream<T> {
    /// Per-handle or per-identifier responses
    pub items: BoxStream<'static, T>,
    /// Exit code of the connector invocation
    pub exit_code: BoxFuture<'static, i64>,
}

impl<T: Send + 'static> ProtocolStream<T> {
    /// Build a stream from already-known items.
    pub fn ready(items: Vec<T>, exit_code: i64) -> Self {
        Self {
            items: futures::stream::iter(items).boxed(),
            exit_code: futures::future::ready(exit_code).boxed(),
        }
    }

    /// Drain every item, then await the exit code.
    pub async fn collect(self) -> (Vec<T>, i64) {
        let items: Vec<T> = self.items.collect().await;
        let exit_code = self.exit_code.await;
        (items, exit_code)
    }
}

impl<T> std::fmt::Debug for ProtocolStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolStream").finish_non_exhaustive()
    }
}
