//! Cancellation utilities
//!
//! The pipeline never polls a cancel handle itself; it forwards the handle to
//! whichever handler or adapter performs the I/O. Adapters use the helpers
//! here to honor it.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;
use crate::streaming::ChunkStream;

/// A handle that can be used to request cancellation.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Request cancellation. Targets observing this handle stop as soon as
    /// they next check it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// A future that resolves when cancellation is requested.
    pub fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// A handle cancelled together with this one, but which can also be
    /// cancelled on its own.
    pub fn child(&self) -> CancelHandle {
        CancelHandle {
            token: self.token.child_token(),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Wrap a chunk stream so it ends with `on_abort()` as soon as `cancel` fires.
///
/// A pending `next()` is woken immediately on cancellation, and dropping the
/// inner stream releases whatever connection it holds.
pub fn abort_on_cancel<T, F>(stream: ChunkStream<T>, cancel: CancelHandle, on_abort: F) -> ChunkStream<T>
where
    T: Send + 'static,
    F: Fn() -> LlmError + Send + Sync + 'static,
{
    let mut inner = stream;
    let s = async_stream::stream! {
        if cancel.is_cancelled() {
            yield Err(on_abort());
            return;
        }
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    yield Err(on_abort());
                    break;
                }
                item = inner.next() => {
                    let Some(item) = item else { break };
                    yield item;
                }
            }
        }
    };
    Box::pin(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Operation;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn cancel_wakes_pending_next_immediately() {
        let pending: ChunkStream<u8> = Box::pin(futures_util::stream::pending());
        let cancel = CancelHandle::new();
        let mut s = abort_on_cancel(pending, cancel.clone(), || LlmError::Cancelled {
            operation: Operation::Chat,
        });

        let waiter = tokio::spawn(async move { s.next().await });
        tokio::task::yield_now().await;
        cancel.cancel();

        let out = tokio::time::timeout(std::time::Duration::from_millis(200), waiter)
            .await
            .expect("cancel should wake the waiting task")
            .expect("task ok");
        assert!(matches!(out, Some(Err(LlmError::Cancelled { .. }))));
    }

    #[tokio::test]
    async fn already_cancelled_yields_abort_first() {
        let cancel = CancelHandle::new();
        cancel.cancel();
        let inner = crate::streaming::from_results(vec![Ok(1u8)]);
        let mut s = abort_on_cancel(inner, cancel, || LlmError::InternalError("aborted".into()));
        assert!(s.next().await.unwrap().is_err());
        assert!(s.next().await.is_none());
    }

    #[test]
    fn child_follows_parent() {
        let parent = CancelHandle::new();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }
}
