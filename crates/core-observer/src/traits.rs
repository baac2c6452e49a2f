//! Interfaces of the collaborators the observer drives: the coordination ledger, the per-chain
//! observers and signers, and the threshold-signing service.

use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, warn};
use xbridge_primitives::{buf::Buf32, chain::Chain, keygen::KeygenRequest, transfer::Transfer};

/// Client of the coordination ledger.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// All transfers the ledger still considers pending.
    async fn get_all_pending_transfers(&self) -> anyhow::Result<Vec<Transfer>>;

    /// The outstanding keygen request, if any.
    async fn get_keygen(&self) -> anyhow::Result<Option<KeygenRequest>>;

    /// Current ledger height.
    async fn get_block_height(&self) -> anyhow::Result<u64>;

    /// Registers the group key as the TSS address of `chain`.
    async fn set_tss(&self, chain: Chain, address: &str, pubkey: &str) -> anyhow::Result<()>;

    /// This validator's identity as it appears in [`Transfer::signers`].
    fn signer_id(&self) -> String;
}

/// Inclusion state of the outbound transaction of a transfer on its destination chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutboundState {
    /// Mined, but not yet deep enough to count as final.
    pub included: bool,
    pub confirmed: bool,
}

/// Watches one destination chain.
#[async_trait]
pub trait ChainObserver: Send + Sync {
    /// Whether the outbound transaction of transfer `transfer_id` made it onto the chain.
    async fn is_outbound_processed(&self, transfer_id: &str) -> anyhow::Result<OutboundState>;

    /// Records the chain's current outbound nonce on the ledger unless already recorded.
    async fn post_nonce_if_not_recorded(&self) -> anyhow::Result<()>;

    /// Resolves once the outbound transaction of `transfer_id` is confirmed.
    ///
    /// The default polls [`Self::is_outbound_processed`] every `poll_interval`. Observers that get
    /// pushed chain events should override this.
    async fn wait_for_outbound_confirmation(&self, transfer_id: &str, poll_interval: Duration) {
        loop {
            match self.is_outbound_processed(transfer_id).await {
                Ok(state) if state.confirmed => return,
                Ok(state) if state.included => {
                    debug!(
                        %transfer_id,
                        "outbound included but not yet confirmed, keep monitoring"
                    );
                }
                Ok(_) => {}
                Err(e) => warn!(err = %e, %transfer_id, "could not check outbound status"),
            }

            tokio::time::sleep(poll_interval).await;
        }
    }
}

/// Everything needed to build the outbound transaction of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundTx {
    pub sender: Address,
    pub source_chain_id: u64,
    pub to: Address,
    pub amount: U256,
    pub gas_limit: u64,
    pub message: Vec<u8>,
    pub transfer_hash: Buf32,
    pub nonce: u64,
    pub gas_price: U256,
}

/// A signed, chain-encoded outbound transaction.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedOutboundTx {
    /// Hash of the transaction on the destination chain.
    pub hash: String,
    pub raw: Vec<u8>,
}

impl fmt::Debug for SignedOutboundTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "signed tx {} ({} bytes)", self.hash, self.raw.len())
    }
}

/// Produces and submits outbound transactions on one destination chain.
#[async_trait]
pub trait OutboundSigner: Send + Sync {
    /// Takes part in the threshold signing round for `tx`. Fails when this validator is not an
    /// active co-signer.
    async fn sign_outbound_tx(&self, tx: &OutboundTx) -> anyhow::Result<SignedOutboundTx>;

    async fn broadcast(&self, tx: &SignedOutboundTx) -> anyhow::Result<()>;
}

/// The clients for a single destination chain.
#[derive(Debug, Clone)]
pub struct ChainClient {
    pub observer: Arc<dyn ChainObserver>,
    pub signer: Arc<dyn OutboundSigner>,
}

pub type ChainClients = BTreeMap<Chain, ChainClient>;

/// Keygen ceremony input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CeremonyRequest {
    pub pubkeys: Vec<String>,
    pub block_height: u64,
    pub version: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyStatus {
    Success,
    Fail,
}

/// Why a ceremony failed and whom the participants blame for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blame {
    pub fail_reason: String,
    pub blame_nodes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeygenResponse {
    pub status: CeremonyStatus,
    /// The group public key, set on success.
    pub pubkey: String,
    pub blame: Blame,
}

/// The threshold-signing service.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ThresholdSigner: Send + Sync {
    async fn keygen(&self, request: CeremonyRequest) -> anyhow::Result<KeygenResponse>;

    /// Installs `pubkey` as the group key this validator signs with.
    async fn set_pubkey(&self, pubkey: &str) -> anyhow::Result<()>;

    /// Address derived from the installed group key.
    fn address(&self) -> String;

    /// Runs a throwaway signing round with the group key to check that the ceremony produced
    /// usable key shares.
    async fn keysign_sanity_check(&self, pubkey: &str) -> anyhow::Result<()>;
}

macro_rules! impl_opaque_debug {
    ($($trait:ident),*) => {
        $(
            impl fmt::Debug for dyn $trait {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(stringify!($trait))
                }
            }
        )*
    };
}

impl_opaque_debug!(LedgerClient, ChainObserver, OutboundSigner, ThresholdSigner);
