//! Participation in the keygen ceremony requested through the ledger.
//!
//! The coordinator polls the ledger for a keygen request and acts only when the current ledger
//! height is exactly the requested one, once per height. A successful ceremony is followed by
//! installing the group key, publishing it for every destination chain, a sanity keysign and
//! making sure every chain has its outbound nonce recorded. Failed ceremonies are retried with
//! backoff. While retrying the coordinator reports itself as degraded, and a request that keeps
//! failing ends up as failed without taking the process down.

use std::sync::Arc;

use tokio::{select, sync::watch, time::interval};
use tracing::{debug, error, info, warn};
use xbridge_common::retry::{policies::ExponentialBackoff, retry_with_backoff};
use xbridge_config::ObserverConfig;
use xbridge_primitives::{chain::Chain, keygen::KeygenRequest};
use xbridge_tasks::Shutdown;

use crate::{
    errors::KeygenError,
    traits::{CeremonyRequest, CeremonyStatus, ChainClients, LedgerClient, ThresholdSigner},
};

/// Progress of the keygen coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeygenStatus {
    /// No ceremony was due yet.
    Idle,
    Running { height: u64 },
    /// A ceremony attempt failed and will be retried.
    Degraded {
        height: u64,
        failed_attempts: u16,
        last_error: String,
    },
    /// The group key was produced and installed. Chains it could not be published to, or whose
    /// nonce could not be recorded, are listed.
    Completed {
        height: u64,
        pubkey: String,
        failed_publications: Vec<Chain>,
        failed_nonce_posts: Vec<Chain>,
        sanity_check_passed: bool,
    },
    /// All attempts failed.
    Failed { height: u64, error: String },
}

pub struct KeygenCoordinator {
    ledger: Arc<dyn LedgerClient>,
    tss: Arc<dyn ThresholdSigner>,
    chains: Arc<ChainClients>,
    config: Arc<ObserverConfig>,
    status_tx: watch::Sender<KeygenStatus>,
    last_height: Option<u64>,
}

impl std::fmt::Debug for KeygenCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeygenCoordinator")
            .field("status", &*self.status_tx.borrow())
            .field("last_height", &self.last_height)
            .finish_non_exhaustive()
    }
}

impl KeygenCoordinator {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        tss: Arc<dyn ThresholdSigner>,
        chains: Arc<ChainClients>,
        config: Arc<ObserverConfig>,
    ) -> (Self, watch::Receiver<KeygenStatus>) {
        let (status_tx, status_rx) = watch::channel(KeygenStatus::Idle);
        let coordinator = Self {
            ledger,
            tss,
            chains,
            config,
            status_tx,
            last_height: None,
        };

        (coordinator, status_rx)
    }

    pub fn subscribe(&self) -> watch::Receiver<KeygenStatus> {
        self.status_tx.subscribe()
    }

    pub async fn run(mut self, shutdown: Shutdown) {
        let mut ticker = interval(self.config.keygen_poll_interval());

        loop {
            select! {
                _ = shutdown.wait_for_shutdown() => break,
                _ = ticker.tick() => {}
            }

            let Some(request) = self.poll_due_request().await else {
                continue;
            };

            select! {
                _ = shutdown.wait_for_shutdown() => {
                    warn!(height = request.block_number, "shutdown during keygen ceremony");
                    break;
                }
                _ = self.execute(request.clone()) => {}
            }
        }

        info!("keygen coordinator stopped");
    }

    /// Fetches the keygen request and returns it if it's due now and wasn't acted on before.
    async fn poll_due_request(&mut self) -> Option<KeygenRequest> {
        let request = match self.ledger.get_keygen().await {
            Ok(Some(request)) => request,
            Ok(None) => return None,
            Err(e) => {
                debug!(err = %e, "could not fetch keygen request");
                return None;
            }
        };

        let height = match self.ledger.get_block_height().await {
            Ok(height) => height,
            Err(e) => {
                warn!(err = %e, "could not fetch ledger height");
                return None;
            }
        };

        if !request.is_due_at(height) || self.last_height == Some(request.block_number) {
            return None;
        }

        info!(
            height,
            participants = request.pubkeys.len(),
            "keygen ceremony due"
        );
        self.last_height = Some(request.block_number);

        Some(request)
    }

    /// Runs the ceremony for `request` and everything that follows it.
    pub async fn execute(&self, request: KeygenRequest) -> KeygenStatus {
        let height = request.block_number;
        self.status_tx.send_replace(KeygenStatus::Running { height });

        let ceremony = CeremonyRequest {
            pubkeys: request.pubkeys,
            block_height: height,
            version: self.config.keygen_version.clone(),
        };
        let retry = &self.config.keygen_retry;
        let backoff = ExponentialBackoff::new(retry.base_delay_ms, retry.multiplier_pct, 100)
            .with_max_delay_ms(retry.max_delay_ms);

        let res = retry_with_backoff("keygen", retry.max_retries, &backoff, |attempt| {
            self.attempt_ceremony(&ceremony, attempt)
        })
        .await;

        let status = match res {
            Ok(pubkey) => self.publish(height, pubkey).await,
            Err(e) => {
                error!(err = %e, height, "giving up on keygen ceremony");
                KeygenStatus::Failed {
                    height,
                    error: e.to_string(),
                }
            }
        };

        self.status_tx.send_replace(status.clone());
        status
    }

    async fn attempt_ceremony(
        &self,
        request: &CeremonyRequest,
        attempt: u16,
    ) -> Result<String, KeygenError> {
        let res = self.ceremony(request).await;
        if let Err(e) = &res {
            self.status_tx.send_replace(KeygenStatus::Degraded {
                height: request.block_height,
                failed_attempts: attempt + 1,
                last_error: e.to_string(),
            });
        }

        res
    }

    async fn ceremony(&self, request: &CeremonyRequest) -> Result<String, KeygenError> {
        let response = self
            .tss
            .keygen(request.clone())
            .await
            .map_err(KeygenError::Ceremony)?;

        if response.status == CeremonyStatus::Fail || response.pubkey.is_empty() {
            return Err(KeygenError::Rejected {
                reason: response.blame.fail_reason,
                blame_nodes: response.blame.blame_nodes,
            });
        }
        info!(pubkey = %response.pubkey, "keygen ceremony succeeded");

        self.tss
            .set_pubkey(&response.pubkey)
            .await
            .map_err(KeygenError::SetPubKey)?;

        Ok(response.pubkey)
    }

    async fn publish(&self, height: u64, pubkey: String) -> KeygenStatus {
        let address = self.tss.address();

        let mut failed_publications = Vec::new();
        for chain in self.config.destination_chains() {
            match self.ledger.set_tss(chain, &address, &pubkey).await {
                Ok(()) => info!(%chain, %address, "published group key"),
                Err(e) => {
                    error!(err = %e, %chain, "could not publish group key");
                    failed_publications.push(chain);
                }
            }
        }

        let sanity_check_passed = match self.tss.keysign_sanity_check(&pubkey).await {
            Ok(()) => true,
            Err(e) => {
                error!(err = %e, "sanity keysign with the new group key failed");
                false
            }
        };

        let mut failed_nonce_posts = Vec::new();
        for chain in self.config.destination_chains() {
            let Some(client) = self.chains.get(&chain) else {
                warn!(%chain, "no chain client to record the nonce with");
                failed_nonce_posts.push(chain);
                continue;
            };
            if let Err(e) = client.observer.post_nonce_if_not_recorded().await {
                error!(err = %e, %chain, "could not record outbound nonce");
                failed_nonce_posts.push(chain);
            }
        }

        info!(
            height,
            failed_publications = failed_publications.len(),
            failed_nonce_posts = failed_nonce_posts.len(),
            "keygen done"
        );

        KeygenStatus::Completed {
            height,
            pubkey,
            failed_publications,
            failed_nonce_posts,
            sanity_check_passed,
        }
    }
}
