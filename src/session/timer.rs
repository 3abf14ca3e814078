//! One-shot turn countdown

use std::future::Future;
use std::time::Duration;
use tokio::sync::oneshot;

/// Runs a callback once after `duration` unless cancelled first.
///
/// Dropping the timer cancels it. Once the callback has started, cancelling
/// no longer has any effect, so callbacks must re-check whatever state they
/// act on.
#[derive(Debug)]
pub struct TurnTimer {
    cancel: Option<oneshot::Sender<()>>,
}

impl TurnTimer {
    pub fn start<F, Fut>(duration: Duration, on_expire: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();

        // `sleep` clamps oversized durations instead of overflowing
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(duration) => on_expire().await,
                _ = cancel_rx => tracing::trace!("Turn timer cancelled"),
            }
        });

        Self {
            cancel: Some(cancel_tx),
        }
    }

    pub fn cancel(mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }
}
