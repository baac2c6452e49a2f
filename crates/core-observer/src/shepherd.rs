//! Carries a single transfer from dispatch to a confirmed outbound transaction.
//!
//! A shepherd first parses everything it needs from the transfer and gives up right away if
//! anything is malformed. If the outbound transaction is not already confirmed it starts a
//! confirmation monitor and then ticks, attempting to sign whenever the transfer's slot in the
//! signing schedule comes around. Signing failures are expected (the validator may not be an
//! active co-signer) and only logged. The signed transaction is broadcast only by the designated
//! broadcaster and its successor.

use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;
use tokio::{
    select,
    sync::oneshot,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};
use xbridge_config::ObserverConfig;
use xbridge_primitives::{chain::Chain, errors::ParseError, transfer::Transfer};
use xbridge_tasks::Shutdown;

use crate::{
    errors::{ShepherdError, ShepherdResult},
    manager::TransferWorker,
    schedule::{is_sign_slot, scheduling_offset, Clock},
    traits::{ChainClient, ChainClients, OutboundTx},
};

/// How a shepherd ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShepherdOutcome {
    /// The outbound transaction was confirmed before the shepherd did anything.
    AlreadyProcessed,
    Confirmed,
    Shutdown,
}

/// Result of a single sign attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignAttempt {
    Confirmed,
    /// Included on the destination chain, waiting for it to be confirmed.
    Included,
    SignFailed,
    Signed,
    Broadcast,
}

/// A transfer with everything parsed that the shepherd needs.
#[derive(Debug)]
struct PreparedTransfer {
    id: String,
    chain: Chain,
    client: ChainClient,
    tx: OutboundTx,
    offset: u64,
    broadcasts: bool,
}

/// Shared state of all shepherds.
pub struct ShepherdContext {
    chains: Arc<ChainClients>,
    config: Arc<ObserverConfig>,
    clock: Arc<dyn Clock>,
    signer_id: String,
}

impl std::fmt::Debug for ShepherdContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShepherdContext")
            .field("chains", &self.chains.keys().collect::<Vec<_>>())
            .field("signer_id", &self.signer_id)
            .finish_non_exhaustive()
    }
}

impl ShepherdContext {
    pub fn new(
        chains: Arc<ChainClients>,
        config: Arc<ObserverConfig>,
        clock: Arc<dyn Clock>,
        signer_id: String,
    ) -> Self {
        Self {
            chains,
            config,
            clock,
            signer_id,
        }
    }

    /// Shepherds `transfer` until its outbound transaction is confirmed or `shutdown` fires.
    pub async fn run(
        &self,
        transfer: &Transfer,
        shutdown: &Shutdown,
    ) -> ShepherdResult<ShepherdOutcome> {
        let prepared = self.prepare(transfer)?;
        let id = prepared.id.as_str();
        let observer = &prepared.client.observer;

        let state = select! {
            _ = shutdown.wait_for_shutdown() => return Ok(ShepherdOutcome::Shutdown),
            state = observer.is_outbound_processed(id) => state,
        };
        match state {
            Ok(state) if state.confirmed => {
                info!(%id, chain = %prepared.chain, "outbound already confirmed");
                return Ok(ShepherdOutcome::AlreadyProcessed);
            }
            Ok(_) => {}
            Err(e) => warn!(err = %e, %id, "could not check outbound status"),
        }

        let (confirmed_tx, mut confirmed_rx) = oneshot::channel();
        let _monitor = {
            let observer = observer.clone();
            let monitor_id = id.to_string();
            let poll_interval = self.config.monitor_interval();
            AbortOnDrop(tokio::spawn(async move {
                observer
                    .wait_for_outbound_confirmation(&monitor_id, poll_interval)
                    .await;
                let _ = confirmed_tx.send(());
            }))
        };
        let mut monitor_alive = true;

        let mut ticker = interval(self.config.sign_tick());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let cycle = self.config.schedule_cycle_secs;

        loop {
            select! {
                biased;

                res = &mut confirmed_rx, if monitor_alive => match res {
                    Ok(()) => {
                        info!(%id, "outbound confirmed");
                        return Ok(ShepherdOutcome::Confirmed);
                    }
                    Err(_) => {
                        warn!(%id, "confirmation monitor stopped");
                        monitor_alive = false;
                        continue;
                    }
                },

                _ = shutdown.wait_for_shutdown() => return Ok(ShepherdOutcome::Shutdown),

                _ = ticker.tick() => {}
            }

            if !is_sign_slot(self.clock.unix_secs(), prepared.offset, cycle) {
                continue;
            }

            let attempt = select! {
                _ = shutdown.wait_for_shutdown() => return Ok(ShepherdOutcome::Shutdown),
                attempt = self.try_sign(&prepared) => attempt,
            };
            debug!(%id, ?attempt, "sign attempt done");

            if attempt == SignAttempt::Confirmed {
                info!(%id, "outbound confirmed");
                return Ok(ShepherdOutcome::Confirmed);
            }
        }
    }

    fn prepare(&self, transfer: &Transfer) -> ShepherdResult<PreparedTransfer> {
        let id = transfer.id().to_string();
        let hash = transfer.parse_hash()?;
        let amount = transfer.parse_amount()?;
        let gas_price = transfer.parse_gas_price()?;

        let destination = transfer.destination();
        let chain: Chain = destination.chain.parse()?;
        let to = parse_address(destination.address)?;
        let sender = parse_address(&transfer.sender)?;

        let source_chain: Chain = transfer.sender_chain.parse()?;
        let source_chain_id = self
            .config
            .chain_id(source_chain)
            .ok_or(ShepherdError::UnknownSourceChain(source_chain))?;

        let client = self
            .chains
            .get(&chain)
            .cloned()
            .ok_or(ShepherdError::UnsupportedChain(chain))?;

        let message = transfer.decode_message().unwrap_or_else(|e| {
            warn!(err = %e, %id, "undecodable message, signing with an empty payload");
            Vec::new()
        });

        let tx = OutboundTx {
            sender,
            source_chain_id,
            to,
            amount,
            gas_limit: self.config.gas_limit,
            message,
            transfer_hash: hash,
            nonce: transfer.nonce,
            gas_price,
        };

        Ok(PreparedTransfer {
            offset: scheduling_offset(&hash, self.config.schedule_cycle_secs),
            broadcasts: transfer.is_broadcaster(&self.signer_id),
            id,
            chain,
            client,
            tx,
        })
    }

    async fn try_sign(&self, prepared: &PreparedTransfer) -> SignAttempt {
        let id = prepared.id.as_str();
        let client = &prepared.client;

        match client.observer.is_outbound_processed(id).await {
            Ok(state) if state.confirmed => return SignAttempt::Confirmed,
            Ok(state) if state.included => {
                info!(%id, "outbound included but not yet confirmed, checking again next round");
                return SignAttempt::Included;
            }
            Ok(_) => {}
            Err(e) => warn!(err = %e, %id, "could not check outbound status, signing anyway"),
        }

        let tx = &prepared.tx;
        info!(
            %id,
            chain = %prepared.chain,
            to = %tx.to,
            amount = %tx.amount,
            nonce = tx.nonce,
            "signing outbound tx"
        );
        let signed = match client.signer.sign_outbound_tx(tx).await {
            Ok(signed) => signed,
            Err(e) => {
                warn!(err = %e, %id, "signing failed, probably not an active co-signer");
                return SignAttempt::SignFailed;
            }
        };
        info!(%id, tx_hash = %signed.hash, "outbound tx signed");

        if !prepared.broadcasts {
            debug!(%id, "not a broadcaster for this transfer");
            return SignAttempt::Signed;
        }

        match client.signer.broadcast(&signed).await {
            Ok(()) => info!(%id, tx_hash = %signed.hash, "outbound tx broadcast"),
            Err(e) => error!(err = %e, %id, tx_hash = %signed.hash, "broadcast failed"),
        }
        SignAttempt::Broadcast
    }
}

#[async_trait]
impl TransferWorker for ShepherdContext {
    async fn shepherd(&self, transfer: Transfer, shutdown: Shutdown) {
        let id = transfer.id();
        match self.run(&transfer, &shutdown).await {
            Ok(outcome) => info!(%id, ?outcome, "shepherd finished"),
            Err(e) => error!(err = %e, %id, "abandoning transfer until it is polled again"),
        }
    }
}

fn parse_address(s: &str) -> Result<Address, ParseError> {
    s.parse::<Address>()
        .map_err(|_| ParseError::InvalidAddress(s.to_string()))
}

/// Aborts the wrapped task when dropped.
#[derive(Debug)]
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::atomic::Ordering, time::Duration};

    use alloy_primitives::U256;
    use xbridge_primitives::transfer::TransferStatus;
    use xbridge_tasks::ShutdownSignal;

    use super::*;
    use crate::test_utils::{transfer_with_id, FakeChain, TestClock, RECEIVER, SENDER, TEST_EPOCH};

    struct Harness {
        ctx: Arc<ShepherdContext>,
        eth: Arc<FakeChain>,
        bsc: Arc<FakeChain>,
        signal: ShutdownSignal,
    }

    fn harness(signer_id: &str) -> Harness {
        let clock = Arc::new(TestClock::new());
        let eth = FakeChain::new(clock.clone());
        let bsc = FakeChain::new(clock.clone());
        let chains = ChainClients::from([(Chain::Eth, eth.client()), (Chain::Bsc, bsc.client())]);
        let config = ObserverConfig::default();

        Harness {
            ctx: Arc::new(ShepherdContext::new(
                Arc::new(chains),
                Arc::new(config),
                clock,
                signer_id.to_string(),
            )),
            eth,
            bsc,
            signal: ShutdownSignal::new(),
        }
    }

    impl Harness {
        fn spawn(&self, transfer: Transfer) -> JoinHandle<ShepherdResult<ShepherdOutcome>> {
            let ctx = self.ctx.clone();
            let shutdown = self.signal.subscribe();
            tokio::spawn(async move { ctx.run(&transfer, &shutdown).await })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_amount_aborts_before_anything_else() {
        let h = harness("val-a");
        let mut transfer = transfer_with_id(5);
        transfer.amount = "abc".to_string();

        let res = h.spawn(transfer).await.unwrap();

        assert!(matches!(res, Err(ShepherdError::Malformed(_))));
        assert_eq!(h.bsc.status_checks.load(Ordering::SeqCst), 0);
        assert!(h.bsc.sign_times().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_hash_and_gas_price_abort() {
        let h = harness("val-a");

        let mut bad_hash = transfer_with_id(5);
        bad_hash.index = "0x1234".to_string();
        let mut bad_gas = transfer_with_id(6);
        bad_gas.gas_price = "20 gwei".to_string();

        for transfer in [bad_hash, bad_gas] {
            let res = h.spawn(transfer).await.unwrap();
            assert!(matches!(res, Err(ShepherdError::Malformed(_))));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_destination_chain_aborts() {
        let h = harness("val-a");

        let mut transfer = transfer_with_id(5);
        transfer.receiver_chain = "POLYGON".to_string();
        let res = h.spawn(transfer).await.unwrap();
        assert!(matches!(
            res,
            Err(ShepherdError::UnsupportedChain(Chain::Polygon))
        ));

        let mut transfer = transfer_with_id(5);
        transfer.receiver_chain = "SOL".to_string();
        let res = h.spawn(transfer).await.unwrap();
        assert!(matches!(res, Err(ShepherdError::Malformed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_confirmed_skips_signing() {
        let h = harness("val-a");
        h.bsc.set_state(true, true);

        let res = h.spawn(transfer_with_id(5)).await.unwrap();

        assert_eq!(res.unwrap(), ShepherdOutcome::AlreadyProcessed);
        assert!(h.bsc.sign_times().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_signs_only_in_its_slot() {
        let h = harness("val-a");
        h.bsc.fail_signing.store(true, Ordering::SeqCst);

        // offset 5 into every 32 second cycle
        let task = h.spawn(transfer_with_id(0x25));
        tokio::time::sleep(Duration::from_secs(70)).await;
        h.signal.send();

        assert_eq!(task.await.unwrap().unwrap(), ShepherdOutcome::Shutdown);
        assert_eq!(
            h.bsc.sign_times(),
            vec![TEST_EPOCH + 5, TEST_EPOCH + 37, TEST_EPOCH + 69]
        );
        assert_eq!(h.bsc.broadcast_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmed_before_first_slot_never_signs() {
        let h = harness("val-a");
        let task = h.spawn(transfer_with_id(20));

        tokio::time::sleep(Duration::from_secs(5)).await;
        h.bsc.set_state(true, true);

        let res = tokio::time::timeout(Duration::from_secs(3), task)
            .await
            .expect("monitor picks up the confirmation")
            .unwrap();
        assert_eq!(res.unwrap(), ShepherdOutcome::Confirmed);
        assert!(h.bsc.sign_times().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_noticed_within_a_tick() {
        let h = harness("val-a");
        let task = h.spawn(transfer_with_id(20));

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        h.bsc.set_state(true, true);

        let res = tokio::time::timeout(h.ctx.config.sign_tick(), task)
            .await
            .expect("done within one tick of the confirmation")
            .unwrap();
        assert_eq!(res.unwrap(), ShepherdOutcome::Confirmed);
        assert!(h.bsc.sign_times().is_empty());
    }

    /// Observer whose status query never answers.
    struct HangingObserver;

    #[async_trait]
    impl crate::traits::ChainObserver for HangingObserver {
        async fn is_outbound_processed(
            &self,
            _transfer_id: &str,
        ) -> anyhow::Result<crate::traits::OutboundState> {
            std::future::pending().await
        }

        async fn post_nonce_if_not_recorded(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_initial_status_check() {
        let clock = Arc::new(TestClock::new());
        let bsc = FakeChain::new(clock.clone());
        let client = ChainClient {
            observer: Arc::new(HangingObserver),
            signer: bsc.clone(),
        };
        let ctx = ShepherdContext::new(
            Arc::new(ChainClients::from([(Chain::Bsc, client)])),
            Arc::new(ObserverConfig::default()),
            clock,
            "val-a".to_string(),
        );
        let signal = ShutdownSignal::new();
        let shutdown = signal.subscribe();
        let task =
            tokio::spawn(async move { ctx.run(&transfer_with_id(20), &shutdown).await });

        tokio::time::sleep(Duration::from_secs(5)).await;
        signal.send();

        let res = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("shepherd stops despite the hanging query")
            .unwrap();
        assert_eq!(res.unwrap(), ShepherdOutcome::Shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_included_outbound_is_not_signed_again() {
        let h = harness("val-a");
        h.bsc.set_state(true, false);

        let task = h.spawn(transfer_with_id(3));
        tokio::time::sleep(Duration::from_secs(40)).await;
        h.signal.send();

        assert_eq!(task.await.unwrap().unwrap(), ShepherdOutcome::Shutdown);
        assert!(h.bsc.sign_times().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcaster_and_successor_broadcast() {
        // signers are val-a, val-b, val-c and the broadcaster index is 2
        for (me, expect_broadcast) in [("val-c", true), ("val-a", true), ("val-b", false)] {
            let h = harness(me);
            let mut transfer = transfer_with_id(2);
            transfer.broadcaster = 2;

            let task = h.spawn(transfer);
            tokio::time::sleep(Duration::from_secs(4)).await;
            h.signal.send();
            task.await.unwrap().unwrap();

            assert_eq!(h.bsc.sign_times().len(), 1, "{me}");
            assert_eq!(h.bsc.broadcast_count() == 1, expect_broadcast, "{me}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_broadcaster_only_signs() {
        let h = harness("val-a");
        let mut transfer = transfer_with_id(2);
        transfer.broadcaster = 9;

        let task = h.spawn(transfer);
        tokio::time::sleep(Duration::from_secs(4)).await;
        h.signal.send();
        task.await.unwrap().unwrap();

        assert_eq!(h.bsc.sign_times().len(), 1);
        assert_eq!(h.bsc.broadcast_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outbound_tx_contents() {
        let h = harness("val-b");
        let mut transfer = transfer_with_id(1);
        transfer.message = "not base64!".to_string();

        let task = h.spawn(transfer);
        tokio::time::sleep(Duration::from_secs(3)).await;
        h.signal.send();
        task.await.unwrap().unwrap();

        let signed = h.bsc.signed.lock().unwrap();
        let (_, tx) = &signed[0];
        assert_eq!(tx.to, RECEIVER.parse::<Address>().unwrap());
        assert_eq!(tx.sender, SENDER.parse::<Address>().unwrap());
        assert_eq!(tx.source_chain_id, 1);
        assert_eq!(tx.amount, U256::from(1000u64));
        assert_eq!(tx.gas_price, U256::from(20u64));
        assert_eq!(tx.gas_limit, 250_000);
        assert_eq!(tx.nonce, 3);
        assert!(tx.message.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_revert_is_signed_on_sender_chain() {
        let h = harness("val-a");
        let mut transfer = transfer_with_id(1);
        transfer.status = TransferStatus::Revert;

        let task = h.spawn(transfer);
        tokio::time::sleep(Duration::from_secs(3)).await;
        h.signal.send();
        task.await.unwrap().unwrap();

        assert!(h.bsc.sign_times().is_empty());
        let signed = h.eth.signed.lock().unwrap();
        assert_eq!(signed.len(), 1);
        assert_eq!(signed[0].1.to, SENDER.parse::<Address>().unwrap());
        assert_eq!(signed[0].1.message, b"hello");
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirmation_after_broadcast_finishes_shepherd() {
        let h = harness("val-a");
        let task = h.spawn(transfer_with_id(2));

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(h.bsc.broadcast_count(), 1);
        h.bsc.set_state(true, true);

        let res = tokio::time::timeout(Duration::from_secs(3), task)
            .await
            .expect("shepherd notices the confirmation")
            .unwrap();
        assert_eq!(res.unwrap(), ShepherdOutcome::Confirmed);
    }
}
