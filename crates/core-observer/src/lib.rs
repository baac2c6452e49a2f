//! Validator-side orchestration core of the bridge client.
//!
//! Watches the coordination ledger for pending cross-chain transfers and shepherds each one until
//! a threshold-signed outbound transaction is confirmed on its destination chain. Also takes part
//! in the keygen ceremony that establishes the group key every validator signs with.
//!
//! The moving parts, leaves first:
//!
//! * [`poller::PendingTransferPoller`] fetches pending transfers and hands the dispatchable ones
//!   over.
//! * [`manager::ShepherdManager`] deduplicates transfers and bounds how many are worked on at once.
//! * [`shepherd`] drives a single transfer to completion.
//! * [`keygen::KeygenCoordinator`] runs the keygen ceremony when the ledger asks for one.
//!
//! [`observer::CoreObserver`] wires them up on a [`TaskExecutor`](xbridge_tasks::TaskExecutor).

pub mod errors;
pub mod keygen;
pub mod manager;
pub mod metrics;
pub mod observer;
pub mod poller;
pub mod schedule;
pub mod shepherd;
pub mod traits;

#[cfg(test)]
mod test_utils;

pub mod prelude {
    pub use crate::{
        errors::InitError,
        keygen::KeygenStatus,
        observer::{CoreHandles, CoreObserver},
        traits::{
            ChainClient, ChainClients, ChainObserver, LedgerClient, OutboundSigner, ThresholdSigner,
        },
    };
}
