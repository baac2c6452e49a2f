//! Cross-chain transfers as reported by the coordination ledger.

use alloy_primitives::U256;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::{buf::Buf32, errors::ParseError};

/// Lifecycle status of a [`Transfer`]. Transitions are driven by the ledger only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransferStatus {
    /// Inbound leg observed but not yet finalized by the ledger.
    PendingInbound,
    /// Inbound leg finalized; the outbound leg must be settled on the receiver chain.
    Finalized,
    /// The transfer has to be reverted back to the sender on the sender chain.
    Revert,
    /// Outbound leg mined.
    Mined,
    /// Revert leg mined.
    Reverted,
    /// Abandoned.
    Aborted,
}

impl TransferStatus {
    /// Whether a validator has outbound work to do for a transfer in this status.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, TransferStatus::Finalized | TransferStatus::Revert)
    }
}

/// A pending cross-chain transfer.
///
/// Values the observer has to interpret (`amount`, `gas_price`, `index`, `message`) are kept in
/// their wire form and parsed on use, so that one malformed transfer can't poison a whole batch
/// fetched from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    /// `0x`-prefixed hex hash uniquely identifying the transfer.
    pub index: String,
    pub sender: String,
    pub sender_chain: String,
    pub receiver: String,
    pub receiver_chain: String,
    /// Amount to mint on the destination, as a decimal string.
    #[serde(alias = "mMint")]
    pub amount: String,
    /// Base64 encoded message payload forwarded to the destination contract.
    #[serde(default)]
    pub message: String,
    /// Outbound nonce on the destination chain.
    pub nonce: u64,
    /// Gas price to use on the destination chain, as a decimal string.
    pub gas_price: String,
    pub finalized_meta_height: u64,
    /// Ordered identities of the validators co-signing the outbound transaction.
    #[serde(default)]
    pub signers: Vec<String>,
    /// Index into `signers` of the designated broadcaster.
    #[serde(default)]
    pub broadcaster: u64,
    pub status: TransferStatus,
}

/// Where the outbound leg of a transfer has to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Destination<'a> {
    pub address: &'a str,
    pub chain: &'a str,
}

impl Transfer {
    pub fn id(&self) -> &str {
        &self.index
    }

    pub fn is_dispatchable(&self) -> bool {
        self.status.is_dispatchable()
    }

    /// Reverts go back to the sender on the sender chain, everything else to the receiver.
    pub fn destination(&self) -> Destination<'_> {
        if self.status == TransferStatus::Revert {
            Destination {
                address: &self.sender,
                chain: &self.sender_chain,
            }
        } else {
            Destination {
                address: &self.receiver,
                chain: &self.receiver_chain,
            }
        }
    }

    pub fn parse_hash(&self) -> Result<Buf32, ParseError> {
        Buf32::from_prefixed_hex(&self.index)
    }

    pub fn parse_amount(&self) -> Result<U256, ParseError> {
        parse_decimal("amount", &self.amount)
    }

    pub fn parse_gas_price(&self) -> Result<U256, ParseError> {
        parse_decimal("gas_price", &self.gas_price)
    }

    pub fn decode_message(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.message)
    }

    /// Whether `signer_id` is one of the (at most two) co-signers that broadcast the signed
    /// outbound transaction: the designated broadcaster and the one right after it.
    pub fn is_broadcaster(&self, signer_id: &str) -> bool {
        let n = self.signers.len();
        let Ok(primary) = usize::try_from(self.broadcaster) else {
            return false;
        };
        if primary >= n {
            return false;
        }

        self.signers[primary] == signer_id || self.signers[(primary + 1) % n] == signer_id
    }
}

fn parse_decimal(field: &'static str, value: &str) -> Result<U256, ParseError> {
    let invalid = || ParseError::InvalidDecimal {
        field,
        value: value.to_string(),
    };

    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    U256::from_str_radix(value, 10).map_err(|_| invalid())
}
