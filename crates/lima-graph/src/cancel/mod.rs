//! Run-scoped cooperative cancellation.
//!
//! One token is shared by every `visit` call within a single run and is
//! signalled exactly once, the first time a fail-fast run records a failure.
//! Propagation is advisory: callbacks are expected to observe the token and
//! stop early; the engine never preempts caller code that is already running.

use std::sync::Arc;

use tokio::sync::watch;

/// Cooperative cancellation token scoped to one graph run.
///
/// Cloning is cheap and shares the underlying flag, so `visit` callbacks can
/// hand clones to any side work they spawn.
#[derive(Debug, Clone)]
pub struct Cancellation {
    flag: Arc<watch::Sender<bool>>,
}

impl Cancellation {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { flag: Arc::new(tx) }
    }

    /// Check whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }

    /// Wait until cancellation is requested.
    ///
    /// Resolves immediately if the token is already cancelled. The sequential
    /// engine never signals its token, so sync callbacks should only ever
    /// poll [`is_cancelled`](Self::is_cancelled).
    pub async fn cancelled(&self) {
        let mut rx = self.flag.subscribe();
        // wait_for inspects the current value before parking, so a signal
        // sent between subscribe() and here is not missed
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Request cancellation. Idempotent; later calls are no-ops.
    pub(crate) fn cancel(&self) {
        self.flag.send_replace(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_clear() {
        let token = Cancellation::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_flips_all_clones() {
        let token = Cancellation::new();
        let observer = token.clone();
        token.cancel();
        assert!(token.is_cancelled());
        assert!(observer.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let token = Cancellation::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
            true
        });
        token.cancel();
        assert!(handle.await.unwrap());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_when_already_set() {
        let token = Cancellation::new();
        token.cancel();
        token.cancelled().await;
    }
}
