//! Bounded, deduplicated dispatch of transfers to shepherds.

use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tokio::{
    select,
    sync::{mpsc, OwnedSemaphorePermit, Semaphore},
    task::JoinSet,
};
use tracing::{debug, error, info, warn};
use xbridge_primitives::transfer::Transfer;
use xbridge_tasks::Shutdown;

/// Something that carries a single transfer to completion.
#[async_trait]
pub trait TransferWorker: Send + Sync + 'static {
    /// Works on `transfer` until it's done, has to be abandoned, or `shutdown` fires.
    async fn shepherd(&self, transfer: Transfer, shutdown: Shutdown);
}

#[derive(Debug, Error)]
#[error("shepherd manager stopped")]
pub struct ManagerClosed;

/// Sending half used to hand transfers to a running [`ShepherdManager`].
#[derive(Debug, Clone)]
pub struct ManagerHandle {
    transfers_tx: mpsc::Sender<Transfer>,
}

impl ManagerHandle {
    /// Hands over a transfer, waiting until the manager takes it.
    pub async fn submit(&self, transfer: Transfer) -> Result<(), ManagerClosed> {
        self.transfers_tx
            .send(transfer)
            .await
            .map_err(|_| ManagerClosed)
    }
}

/// Owns the set of transfers being shepherded and the pool of slots bounding how many run at once.
///
/// All state is touched from the manager's own loop only. A transfer already in the set is
/// ignored until its shepherd reports back, and a new shepherd is only started once a slot frees
/// up. While waiting for a slot the manager stops taking transfers, which in turn holds up the
/// poller.
#[derive(Debug)]
pub struct ShepherdManager<W> {
    worker: Arc<W>,
    active: HashSet<String>,
    slots: Arc<Semaphore>,
    transfers_rx: mpsc::Receiver<Transfer>,
    done_tx: mpsc::UnboundedSender<String>,
    done_rx: mpsc::UnboundedReceiver<String>,
    shepherds: JoinSet<()>,
}

impl<W: TransferWorker> ShepherdManager<W> {
    /// Creates a manager running at most `max_shepherds` workers concurrently.
    pub fn new(worker: Arc<W>, max_shepherds: usize) -> (Self, ManagerHandle) {
        // rendezvous-like handoff: a single buffered transfer at most
        let (transfers_tx, transfers_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = mpsc::unbounded_channel();

        let manager = Self {
            worker,
            active: HashSet::new(),
            slots: Arc::new(Semaphore::new(max_shepherds)),
            transfers_rx,
            done_tx,
            done_rx,
            shepherds: JoinSet::new(),
        };

        (manager, ManagerHandle { transfers_tx })
    }

    /// Number of transfers currently being shepherded.
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of free slots.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub async fn run(mut self, shutdown: Shutdown) {
        info!(slots = self.available_slots(), "shepherd manager started");

        loop {
            select! {
                biased;

                _ = shutdown.wait_for_shutdown() => break,

                Some(id) = self.done_rx.recv() => self.retire(&id),

                Some(res) = self.shepherds.join_next(), if !self.shepherds.is_empty() => {
                    if let Err(e) = res {
                        error!(err = %e, "shepherd task did not finish cleanly");
                    }
                }

                transfer = self.transfers_rx.recv() => {
                    let Some(transfer) = transfer else {
                        debug!("all manager handles dropped");
                        break;
                    };
                    if !self.admit(transfer, &shutdown).await {
                        break;
                    }
                }
            }
        }

        self.wind_down().await;
    }

    /// Starts a shepherd for `transfer` unless one is already active for it.
    ///
    /// Returns `false` if shutdown fired while waiting for a slot.
    async fn admit(&mut self, transfer: Transfer, shutdown: &Shutdown) -> bool {
        let id = transfer.id().to_string();
        if self.active.contains(&id) {
            debug!(%id, "transfer already being shepherded");
            return true;
        }

        // reserve the id before blocking so duplicates queued behind us are dropped
        self.active.insert(id.clone());

        let permit = select! {
            _ = shutdown.wait_for_shutdown() => {
                self.active.remove(&id);
                return false;
            }
            permit = self.slots.clone().acquire_owned() => permit,
        };
        let Ok(permit) = permit else {
            // the semaphore is never closed
            self.active.remove(&id);
            return false;
        };

        info!(%id, active = self.active.len(), "starting shepherd");

        let exit = ShepherdExit {
            permit: Some(permit),
            done_tx: self.done_tx.clone(),
            id,
        };
        let worker = self.worker.clone();
        let shutdown = shutdown.clone();
        self.shepherds.spawn(async move {
            let _exit = exit;
            worker.shepherd(transfer, shutdown).await;
        });

        true
    }

    fn retire(&mut self, id: &str) {
        if self.active.remove(id) {
            debug!(%id, active = self.active.len(), "shepherd done");
        } else {
            warn!(%id, "completion for a transfer that was not active");
        }
    }

    async fn wind_down(&mut self) {
        info!(active = self.active.len(), "shepherd manager stopping");
        self.transfers_rx.close();

        while let Some(res) = self.shepherds.join_next().await {
            if let Err(e) = res {
                error!(err = %e, "shepherd task did not finish cleanly");
            }
        }

        while let Ok(id) = self.done_rx.try_recv() {
            self.retire(&id);
        }
    }
}

/// Returns the slot and reports completion when a shepherd task ends, however it ends.
struct ShepherdExit {
    permit: Option<OwnedSemaphorePermit>,
    done_tx: mpsc::UnboundedSender<String>,
    id: String,
}

impl Drop for ShepherdExit {
    fn drop(&mut self) {
        // slot first, so the manager never sees a completion while the slot is still taken
        drop(self.permit.take());
        let _ = self.done_tx.send(std::mem::take(&mut self.id));
    }
}
