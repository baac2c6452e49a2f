//! Data types shared by the bridge observer: chains, cross-chain transfers as reported by the
//! coordination ledger, and keygen requests.

pub mod buf;
pub mod chain;
pub mod errors;
pub mod keygen;
pub mod transfer;

pub mod prelude {
    pub use crate::{
        buf::Buf32,
        chain::Chain,
        keygen::KeygenRequest,
        transfer::{Transfer, TransferStatus},
    };
}
