use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::sync::{futures::Notified, Notify};

use crate::pending_tasks::PendingTasks;

/// Sender side of the shutdown signal shared by every task spawned through a
/// [`TaskExecutor`](crate::TaskExecutor).
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>, Arc<Notify>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send shutdown signal
    pub fn send(&self) {
        self.0.fetch_or(true, Ordering::Relaxed);
        self.1.notify_waiters();
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown(self.clone())
    }

    fn should_shutdown(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn notified(&self) -> Notified<'_> {
        self.1.notified()
    }
}

/// Receiver side of the shutdown signal. Cheap to clone and hand to short-lived subtasks.
#[derive(Debug, Clone)]
pub struct Shutdown(ShutdownSignal);

impl Shutdown {
    /// Check if shutdown signal has been sent
    pub fn should_shutdown(&self) -> bool {
        self.0.should_shutdown()
    }

    /// Waits until shutdown signal is sent
    pub async fn wait_for_shutdown(&self) {
        loop {
            // register interest before checking the flag so a `send` in between isn't missed
            let notified = self.0.notified();
            if self.should_shutdown() {
                return;
            }
            notified.await;
        }
    }
}

/// Shutdown handle given to a critical task. The task counts as pending until the guard is
/// dropped, which lets the [`TaskManager`](crate::TaskManager) wait for a graceful exit.
#[derive(Debug)]
pub struct ShutdownGuard(Shutdown, Arc<PendingTasks>);

impl ShutdownGuard {
    pub(crate) fn new(shutdown: Shutdown, pending: Arc<PendingTasks>) -> Self {
        pending.increment();
        Self(shutdown, pending)
    }

    /// Check if shutdown signal has been sent
    pub fn should_shutdown(&self) -> bool {
        self.0.should_shutdown()
    }

    /// Waits until shutdown signal is sent
    pub async fn wait_for_shutdown(&self) {
        self.0.wait_for_shutdown().await
    }

    /// A plain [`Shutdown`] receiver for subtasks of the guarded task.
    pub fn subscribe(&self) -> Shutdown {
        self.0.clone()
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.1.decrement();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_wait_for_shutdown_wakes_all_subscribers() {
        let signal = ShutdownSignal::new();
        let first = signal.subscribe();
        let second = first.clone();

        let waiters = tokio::spawn(async move {
            first.wait_for_shutdown().await;
            second.wait_for_shutdown().await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        signal.send();

        tokio::time::timeout(Duration::from_secs(1), waiters)
            .await
            .expect("waiters should wake up")
            .expect("waiter task should not panic");
    }

    #[tokio::test]
    async fn test_wait_after_send_returns_immediately() {
        let signal = ShutdownSignal::new();
        signal.send();

        let shutdown = signal.subscribe();
        assert!(shutdown.should_shutdown());
        shutdown.wait_for_shutdown().await;
    }

    #[test]
    fn test_guard_tracks_pending_count() {
        let pending = Arc::new(PendingTasks::new(0));
        let signal = ShutdownSignal::new();

        let guard = ShutdownGuard::new(signal.subscribe(), pending.clone());
        assert_eq!(pending.current(), 1);

        drop(guard);
        assert_eq!(pending.current(), 0);
    }
}
