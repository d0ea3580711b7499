//! Lifecycle of a component's free-running loop

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, Instrument, Span};

/// A spawned loop task with its own cancellation token
///
/// Stopping cancels the token and aborts the task, so the loop ends at its
/// next suspension point at the latest. Dropping stops the loop.
#[derive(Debug)]
pub(crate) struct LoopTask {
    name: &'static str,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl LoopTask {
    /// Spawn `body` inside `span`; the body receives the loop's token
    pub(crate) fn spawn<F, Fut>(name: &'static str, span: Span, body: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        let handle = tokio::spawn(body(token.clone()).instrument(span));
        debug!("{} loop started", name);

        LoopTask {
            name,
            token,
            handle: Some(handle),
        }
    }

    /// Cancel and abort the loop
    pub(crate) fn stop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
            debug!("{} loop stopped", self.name);
        }
    }

    /// True once the loop has returned or been stopped
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |handle| handle.is_finished())
    }
}

impl Drop for LoopTask {
    fn drop(&mut self) {
        self.stop();
    }
}
