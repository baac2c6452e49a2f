use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};

use anyhow::bail;
use async_trait::async_trait;
use tokio::time::Instant;
use xbridge_primitives::transfer::{Transfer, TransferStatus};

use crate::{
    schedule::Clock,
    traits::{
        ChainClient, ChainObserver, OutboundSigner, OutboundState, OutboundTx, SignedOutboundTx,
    },
};

pub(crate) const SENDER: &str = "0x1111111111111111111111111111111111111111";
pub(crate) const RECEIVER: &str = "0x2222222222222222222222222222222222222222";

/// Unix time at which tests start, a multiple of 32.
pub(crate) const TEST_EPOCH: u64 = 1_700_000_000;

/// A finalized ETH -> BSC transfer whose hash starts with `first_byte`.
pub(crate) fn transfer_with_id(first_byte: u8) -> Transfer {
    Transfer {
        index: format!("0x{first_byte:02x}{}", "ab".repeat(31)),
        sender: SENDER.to_string(),
        sender_chain: "ETH".to_string(),
        receiver: RECEIVER.to_string(),
        receiver_chain: "BSC".to_string(),
        amount: "1000".to_string(),
        message: "aGVsbG8=".to_string(),
        nonce: 3,
        gas_price: "20".to_string(),
        finalized_meta_height: 100,
        signers: vec!["val-a".into(), "val-b".into(), "val-c".into()],
        broadcaster: 0,
        status: TransferStatus::Finalized,
    }
}

/// Wall clock driven by tokio's (pausable) clock.
#[derive(Debug)]
pub(crate) struct TestClock {
    base: u64,
    start: Instant,
}

impl TestClock {
    pub(crate) fn new() -> Self {
        Self {
            base: TEST_EPOCH,
            start: Instant::now(),
        }
    }
}

impl Clock for TestClock {
    fn unix_secs(&self) -> u64 {
        self.base + self.start.elapsed().as_secs()
    }
}

/// Observer and signer of a fake destination chain.
pub(crate) struct FakeChain {
    clock: Arc<TestClock>,
    pub(crate) state: Mutex<OutboundState>,
    pub(crate) status_checks: AtomicUsize,
    /// Unix seconds of every sign attempt along with the transaction.
    pub(crate) signed: Mutex<Vec<(u64, OutboundTx)>>,
    pub(crate) broadcasts: AtomicUsize,
    pub(crate) fail_signing: AtomicBool,
    pub(crate) nonce_posts: AtomicUsize,
    pub(crate) fail_nonce_post: AtomicBool,
}

impl FakeChain {
    pub(crate) fn new(clock: Arc<TestClock>) -> Arc<Self> {
        Arc::new(Self {
            clock,
            state: Mutex::new(OutboundState::default()),
            status_checks: AtomicUsize::new(0),
            signed: Mutex::new(Vec::new()),
            broadcasts: AtomicUsize::new(0),
            fail_signing: AtomicBool::new(false),
            nonce_posts: AtomicUsize::new(0),
            fail_nonce_post: AtomicBool::new(false),
        })
    }

    pub(crate) fn client(self: &Arc<Self>) -> ChainClient {
        ChainClient {
            observer: self.clone(),
            signer: self.clone(),
        }
    }

    pub(crate) fn set_state(&self, included: bool, confirmed: bool) {
        *self.state.lock().unwrap() = OutboundState {
            included,
            confirmed,
        };
    }

    pub(crate) fn sign_times(&self) -> Vec<u64> {
        self.signed.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub(crate) fn broadcast_count(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainObserver for FakeChain {
    async fn is_outbound_processed(&self, _transfer_id: &str) -> anyhow::Result<OutboundState> {
        self.status_checks.fetch_add(1, Ordering::SeqCst);
        Ok(*self.state.lock().unwrap())
    }

    async fn post_nonce_if_not_recorded(&self) -> anyhow::Result<()> {
        self.nonce_posts.fetch_add(1, Ordering::SeqCst);
        if self.fail_nonce_post.load(Ordering::SeqCst) {
            bail!("nonce rpc unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl OutboundSigner for FakeChain {
    async fn sign_outbound_tx(&self, tx: &OutboundTx) -> anyhow::Result<SignedOutboundTx> {
        self.signed
            .lock()
            .unwrap()
            .push((self.clock.unix_secs(), tx.clone()));
        if self.fail_signing.load(Ordering::SeqCst) {
            bail!("not an active co-signer");
        }

        Ok(SignedOutboundTx {
            hash: format!("0xsigned{}", tx.nonce),
            raw: vec![0xf8],
        })
    }

    async fn broadcast(&self, _tx: &SignedOutboundTx) -> anyhow::Result<()> {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
