use std::{sync::Arc, time::Duration};

use tokio::{
    select,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};
use xbridge_tasks::Shutdown;

use crate::{
    manager::{ManagerClosed, ManagerHandle},
    metrics::ObserverMetrics,
    traits::LedgerClient,
};

/// Periodically fetches pending transfers from the ledger and hands the dispatchable ones to the
/// shepherd manager.
#[derive(Debug)]
pub struct PendingTransferPoller {
    ledger: Arc<dyn LedgerClient>,
    manager: ManagerHandle,
    metrics: Arc<ObserverMetrics>,
    poll_interval: Duration,
}

impl PendingTransferPoller {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        manager: ManagerHandle,
        metrics: Arc<ObserverMetrics>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            ledger,
            manager,
            metrics,
            poll_interval,
        }
    }

    pub async fn run(self, shutdown: Shutdown) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                _ = shutdown.wait_for_shutdown() => break,
                _ = ticker.tick() => {}
            }

            let res = select! {
                _ = shutdown.wait_for_shutdown() => break,
                res = self.poll_once() => res,
            };
            if let Err(e) = res {
                warn!(err = %e, "stopping pending transfer poller");
                break;
            }
        }

        info!("pending transfer poller stopped");
    }

    /// Fetches the pending transfers once and forwards the dispatchable ones.
    ///
    /// Returns the number of transfers forwarded. A failed fetch is logged and skipped.
    pub async fn poll_once(&self) -> Result<usize, ManagerClosed> {
        let transfers = match self.ledger.get_all_pending_transfers().await {
            Ok(transfers) => transfers,
            Err(e) => {
                warn!(err = %e, "could not fetch pending transfers");
                return Ok(0);
            }
        };

        self.metrics.set_pending_transfers(transfers.len());
        if !transfers.is_empty() {
            info!(pending = transfers.len(), "fetched pending transfers");
        }

        let mut forwarded = 0;
        for transfer in transfers {
            if !transfer.is_dispatchable() {
                debug!(id = %transfer.id(), status = ?transfer.status, "skipping transfer");
                continue;
            }
            self.manager.submit(transfer).await?;
            forwarded += 1;
        }

        Ok(forwarded)
    }
}
