//! A shutdown latch that accept loops `select!` against.
//!
//! Closing is idempotent and broadcast to every waiter; already-accepted
//! connections are not touched, only the listener's accept loop exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Clone)]
pub struct Signal {
    closed: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Signal {
    pub fn new() -> Self {
        Signal {
            closed: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves once `close` has been called. Resolves immediately if
    /// already closed.
    pub async fn wait(&self) {
        if self.is_closed() {
            return;
        }
        let notified = self.notify.notified();
        if self.is_closed() {
            return;
        }
        notified.await;
    }
}

impl Default for Signal {
    fn default() -> Self {
        Signal::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn wait_resolves_after_close() {
        let sig = Signal::new();
        let waiter = sig.clone();
        let handle = tokio::spawn(async move {
            waiter.wait().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        sig.close();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("wait should resolve after close")
            .unwrap();
    }

    #[tokio::test]
    async fn wait_resolves_immediately_if_already_closed() {
        let sig = Signal::new();
        sig.close();
        tokio::time::timeout(Duration::from_millis(50), sig.wait())
            .await
            .expect("already-closed signal should not block");
    }

    #[test]
    fn close_is_idempotent() {
        let sig = Signal::new();
        sig.close();
        sig.close();
        assert!(sig.is_closed());
    }
}
