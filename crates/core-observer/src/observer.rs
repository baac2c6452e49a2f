use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;
use xbridge_config::ObserverConfig;
use xbridge_tasks::TaskExecutor;

use crate::{
    errors::InitError,
    keygen::{KeygenCoordinator, KeygenStatus},
    manager::ShepherdManager,
    metrics::ObserverMetrics,
    poller::PendingTransferPoller,
    schedule::{Clock, SystemClock},
    shepherd::ShepherdContext,
    traits::{ChainClients, LedgerClient, ThresholdSigner},
};

/// Entry point wiring the pending transfer poller, the shepherd manager and the keygen
/// coordinator onto a task executor.
///
/// The host process is expected to set up logging with [`xbridge_common::logging::init`] and to
/// drive the executor with a [`TaskManager`](xbridge_tasks::TaskManager):
///
/// ```ignore
/// xbridge_common::logging::init(LoggerConfig::with_base_name("xbridge-observer"));
/// let manager = TaskManager::new(runtime.handle().clone());
/// manager.start_signal_listeners();
/// let observer = CoreObserver::new(ledger, tss, chains, config)?;
/// observer.monitor_core(&manager.executor());
/// manager.monitor(Some(Duration::from_secs(5)))?;
/// xbridge_common::logging::finalize();
/// ```
pub struct CoreObserver {
    ledger: Arc<dyn LedgerClient>,
    tss: Arc<dyn ThresholdSigner>,
    chains: Arc<ChainClients>,
    config: Arc<ObserverConfig>,
    metrics: Arc<ObserverMetrics>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreObserver")
            .field("chains", &self.chains.keys().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Handles to observe a running [`CoreObserver`].
#[derive(Debug, Clone)]
pub struct CoreHandles {
    pub keygen_status: watch::Receiver<KeygenStatus>,
}

impl CoreObserver {
    /// Fails if `config` doesn't pass [`ObserverConfig::validate`].
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        tss: Arc<dyn ThresholdSigner>,
        chains: ChainClients,
        config: ObserverConfig,
    ) -> Result<Self, InitError> {
        config.validate()?;

        Ok(Self {
            ledger,
            tss,
            chains: Arc::new(chains),
            config: Arc::new(config),
            metrics: Arc::new(ObserverMetrics::new()?),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replaces the wall clock used by the signing schedule.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> Arc<ObserverMetrics> {
        self.metrics.clone()
    }

    /// Starts all observer loops as critical tasks. They run until the executor's shutdown signal
    /// fires.
    pub fn monitor_core(&self, executor: &TaskExecutor) -> CoreHandles {
        let signer_id = self.ledger.signer_id();
        info!(
            %signer_id,
            chains = ?self.chains.keys().collect::<Vec<_>>(),
            "starting core observer"
        );

        let shepherds = ShepherdContext::new(
            self.chains.clone(),
            self.config.clone(),
            self.clock.clone(),
            signer_id,
        );
        let (manager, manager_handle) =
            ShepherdManager::new(Arc::new(shepherds), self.config.max_shepherds);
        executor.spawn_critical_async_with_shutdown("shepherd-manager", |guard| async move {
            manager.run(guard.subscribe()).await;
        });

        let poller = PendingTransferPoller::new(
            self.ledger.clone(),
            manager_handle,
            self.metrics.clone(),
            self.config.pending_poll_interval(),
        );
        executor.spawn_critical_async_with_shutdown("pending-transfer-poller", |guard| async move {
            poller.run(guard.subscribe()).await;
        });

        let (keygen, keygen_status) = KeygenCoordinator::new(
            self.ledger.clone(),
            self.tss.clone(),
            self.chains.clone(),
            self.config.clone(),
        );
        executor.spawn_critical_async_with_shutdown("keygen-coordinator", |guard| async move {
            keygen.run(guard.subscribe()).await;
        });

        CoreHandles { keygen_status }
    }
}
