//! Prometheus metrics of the observer.

use std::fmt;

use prometheus::{IntGauge, Registry};

/// Name of the gauge tracking the pending transfer count.
pub const PENDING_TRANSFERS: &str = "xbridge_pending_transfers";

pub struct ObserverMetrics {
    registry: Registry,
    pending_transfers: IntGauge,
}

impl fmt::Debug for ObserverMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverMetrics")
            .field("pending_transfers", &self.pending_transfers.get())
            .finish()
    }
}

impl ObserverMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let pending_transfers = IntGauge::new(
            PENDING_TRANSFERS,
            "Number of pending transfers in the latest ledger poll",
        )?;
        registry.register(Box::new(pending_transfers.clone()))?;

        Ok(Self {
            registry,
            pending_transfers,
        })
    }

    /// Registry to expose from whatever scrape endpoint the host process runs.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn set_pending_transfers(&self, count: usize) {
        self.pending_transfers
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    pub fn pending_transfers(&self) -> i64 {
        self.pending_transfers.get()
    }
}
