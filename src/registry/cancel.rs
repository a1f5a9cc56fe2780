//! Subscription cancellation with a cause
//!
//! Every subscription carries a [`Canceller`] that the registry fires exactly
//! once when the subscription is torn down. Work tied to the subscription holds
//! the matching [`SubscriptionContext`] and observes why it ended.

use thiserror::Error;
use tokio::sync::watch;

/// Why a subscription was torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum CloseReason {
    /// The client closed this subscription id
    #[error("subscription closed by client")]
    ClosedByClient,
    /// The client connection went away
    #[error("connection closed")]
    ConnectionClosed,
    /// The relay is shutting down
    #[error("relay shutting down")]
    RelayShutdown,
}

type CancelFn = Box<dyn FnOnce(CloseReason) + Send + Sync>;

/// Single-use cancellation capability
///
/// Runs under the registry lock: if its side effects are slow, hand them off
/// to a separate task.
pub struct Canceller(CancelFn);

impl Canceller {
    /// Wrap a callback
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(CloseReason) + Send + Sync + 'static,
    {
        Self(Box::new(f))
    }

    /// A canceller with no side effects
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Fire the callback, consuming the canceller
    pub fn cancel(self, reason: CloseReason) {
        (self.0)(reason)
    }
}

impl std::fmt::Debug for Canceller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Canceller").finish_non_exhaustive()
    }
}

/// Observer side of a [`Canceller`] created by [`cancel_pair`]
#[derive(Debug, Clone)]
pub struct SubscriptionContext {
    rx: watch::Receiver<Option<CloseReason>>,
}

impl SubscriptionContext {
    /// The cause, if the subscription has been cancelled
    pub fn cause(&self) -> Option<CloseReason> {
        *self.rx.borrow()
    }

    /// Whether the subscription has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cause().is_some()
    }

    /// Wait until the subscription is cancelled and return the cause
    ///
    /// A canceller dropped without firing means the subscription never reached
    /// the registry because its connection was already gone.
    pub async fn cancelled(&mut self) -> CloseReason {
        // Err only means the sender is gone; the last value still tells the cause
        let _ = self.rx.wait_for(Option::is_some).await;
        self.cause().unwrap_or(CloseReason::ConnectionClosed)
    }
}

/// Create a linked canceller and context
pub fn cancel_pair() -> (Canceller, SubscriptionContext) {
    let (tx, rx) = watch::channel(None);
    let canceller = Canceller::new(move |reason| {
        tx.send_replace(Some(reason));
    });
    (canceller, SubscriptionContext { rx })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_close_reason_display() {
        assert_eq!(
            CloseReason::ClosedByClient.to_string(),
            "subscription closed by client"
        );
    }

    #[test]
    fn test_canceller_runs_callback() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let canceller = Canceller::new(move |reason| {
            assert_eq!(reason, CloseReason::RelayShutdown);
            counted.fetch_add(1, Ordering::SeqCst);
        });

        canceller.cancel(CloseReason::RelayShutdown);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_context_observes_cause() {
        let (canceller, mut ctx) = cancel_pair();
        assert!(!ctx.is_cancelled());

        let waiter = tokio::spawn({
            let mut ctx = ctx.clone();
            async move { ctx.cancelled().await }
        });

        canceller.cancel(CloseReason::ClosedByClient);

        let cause = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cause, CloseReason::ClosedByClient);
        assert_eq!(ctx.cause(), Some(CloseReason::ClosedByClient));
        assert_eq!(ctx.cancelled().await, CloseReason::ClosedByClient);
    }

    #[tokio::test]
    async fn test_dropped_canceller() {
        let (canceller, mut ctx) = cancel_pair();
        drop(canceller);

        assert_eq!(ctx.cancelled().await, CloseReason::ConnectionClosed);
        assert!(!ctx.is_cancelled());
    }
}
