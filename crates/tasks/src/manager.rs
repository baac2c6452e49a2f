use std::{
    any::Any,
    fmt::{Display, Formatter},
    future::Future,
    panic,
    sync::Arc,
    time::Duration,
};

use futures_util::{FutureExt, TryFutureExt};
use tokio::{runtime::Handle, sync::mpsc};
use tracing::{debug, error, info, warn};

use crate::{
    pending_tasks::PendingTasks,
    shutdown::{Shutdown, ShutdownGuard, ShutdownSignal},
};

/// Error with the name of the task that panicked and an error downcasted to string, if possible.
#[derive(Debug, thiserror::Error)]
pub struct PanickedTaskError {
    task_name: String,
    error: Option<String>,
}

impl Display for PanickedTaskError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let task_name = &self.task_name;
        if let Some(error) = &self.error {
            write!(f, "Critical task `{task_name}` panicked: `{error}`")
        } else {
            write!(f, "Critical task `{task_name}` panicked")
        }
    }
}

impl PanickedTaskError {
    fn new(task_name: &str, error: Box<dyn Any + Send>) -> Self {
        let error = match error.downcast::<String>() {
            Ok(value) => Some(*value),
            Err(error) => match error.downcast::<&str>() {
                Ok(value) => Some(value.to_string()),
                Err(_) => None,
            },
        };

        Self {
            task_name: task_name.to_string(),
            error,
        }
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }
}

/// [`TaskManager`] spawns and tracks long running tasks,
/// watches for task panics and manages graceful shutdown
/// on critical task panics and external signals.
#[derive(Debug)]
pub struct TaskManager {
    /// Tokio's runtime [`Handle`].
    tokio_handle: Handle,
    /// Channel's sender tasked with sending `panic` signals from tasks.
    panicked_tasks_tx: mpsc::UnboundedSender<PanickedTaskError>,
    /// Channel's receiver tasked with receiving `panic` signals from tasks.
    panicked_tasks_rx: mpsc::UnboundedReceiver<PanickedTaskError>,
    /// Async-capable shutdown signal that can be sent to tasks.
    shutdown_signal: ShutdownSignal,
    /// Tasks still holding a [`ShutdownGuard`].
    pending_tasks: Arc<PendingTasks>,
}

impl TaskManager {
    pub fn new(tokio_handle: Handle) -> Self {
        let (panicked_tasks_tx, panicked_tasks_rx) = mpsc::unbounded_channel();

        Self {
            tokio_handle,
            panicked_tasks_tx,
            panicked_tasks_rx,
            shutdown_signal: ShutdownSignal::new(),
            pending_tasks: Arc::new(PendingTasks::new(0)),
        }
    }

    pub fn executor(&self) -> TaskExecutor {
        TaskExecutor {
            tokio_handle: self.tokio_handle.clone(),
            panicked_tasks_tx: self.panicked_tasks_tx.clone(),
            shutdown_signal: self.shutdown_signal.clone(),
            pending_tasks: self.pending_tasks.clone(),
        }
    }

    /// Get shutdown signal trigger
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown_signal.clone()
    }

    /// Number of guarded tasks that have not exited yet.
    pub fn pending_tasks(&self) -> usize {
        self.pending_tasks.current()
    }

    /// Add signal listeners and send shutdown
    pub fn start_signal_listeners(&self) {
        let shutdown_signal = self.shutdown_signal();

        self.tokio_handle.spawn(async move {
            // TODO: listen for SIGTERM as well, containers stop with it
            let _ = tokio::signal::ctrl_c().await;

            warn!("got INT, initiating shutdown");
            shutdown_signal.send()
        });
    }

    /// waits until any tasks panic, returns `Err(first_panic_error)`
    /// returns `Ok(())` if shutdown message is received instead
    async fn wait_for_task_panic(&mut self, shutdown: Shutdown) -> Result<(), PanickedTaskError> {
        tokio::select! {
            msg = self.panicked_tasks_rx.recv() => {
                match msg {
                    Some(error) => Err(error),
                    None => Ok(())
                }
            }
            _ = shutdown.wait_for_shutdown() => {
                Ok(())
            }
        }
    }

    /// Sends the shutdown signal and waits for all guarded tasks to exit.
    ///
    /// Returns `false` if tasks were still running when `timeout` expired.
    pub async fn shutdown_gracefully(&self, timeout: Option<Duration>) -> bool {
        self.shutdown_signal.send();

        let wait = self.pending_tasks.clone().wait_for_zero();
        let in_time = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, wait).await.is_ok(),
            None => {
                wait.await;
                true
            }
        };

        if in_time {
            debug!("gracefully shut down");
        } else {
            debug!(pending = self.pending_tasks.current(), "graceful shutdown timed out");
        }

        in_time
    }

    /// Async counterpart of [`Self::monitor`] for callers already inside the runtime.
    pub async fn monitor_async(
        mut self,
        shutdown_timeout: Option<Duration>,
    ) -> Result<(), PanickedTaskError> {
        let res = self
            .wait_for_task_panic(self.shutdown_signal.subscribe())
            .await;

        if !self.shutdown_gracefully(shutdown_timeout).await {
            info!("shutdown timeout expired; forced shutdown");
        }

        res
    }

    /// Blocks the current thread until a critical task panics or shutdown is requested, then
    /// winds all tasks down.
    pub fn monitor(self, shutdown_timeout: Option<Duration>) -> Result<(), PanickedTaskError> {
        let handle = self.tokio_handle.clone();
        handle.block_on(self.monitor_async(shutdown_timeout))
    }
}

/// A type that can spawn new tasks
#[derive(Debug, Clone)]
pub struct TaskExecutor {
    /// Handle to the tokio runtime.
    tokio_handle: Handle,
    /// Sender half for sending panic signals from tasks
    panicked_tasks_tx: mpsc::UnboundedSender<PanickedTaskError>,
    /// send shutdown signals to tasks
    shutdown_signal: ShutdownSignal,
    /// tasks that hold a guard
    pending_tasks: Arc<PendingTasks>,
}

impl TaskExecutor {
    /// Spawns a critical async task that is handed a [`ShutdownGuard`].
    ///
    /// The task is expected to watch the guard and return once shutdown is signalled. A panic is
    /// reported to the [`TaskManager`], which then shuts everything down.
    pub fn spawn_critical_async_with_shutdown<F>(
        &self,
        name: &'static str,
        async_func: impl FnOnce(ShutdownGuard) -> F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let panicked_tasks_tx = self.panicked_tasks_tx.clone();
        let shutdown = ShutdownGuard::new(
            self.shutdown_signal.subscribe(),
            self.pending_tasks.clone(),
        );
        let fut = async_func(shutdown);

        // wrap the task in catch unwind
        let task = panic::AssertUnwindSafe(fut)
            .catch_unwind()
            .map_err(move |error| {
                let task_error = PanickedTaskError::new(name, error);
                error!("{task_error}");
                let _ = panicked_tasks_tx.send(task_error);
            })
            .map(drop);

        debug!(%name, "spawning critical task");
        self.tokio_handle.spawn(task)
    }

    /// A receiver for the shutdown signal, for tasks that don't need to be waited on.
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown_signal.subscribe()
    }
}
