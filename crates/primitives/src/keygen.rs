use serde::{Deserialize, Serialize};

/// A request recorded on the ledger asking every validator to take part in a keygen ceremony at a
/// given ledger height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeygenRequest {
    /// Ledger height at which the ceremony starts.
    pub block_number: u64,

    /// Public keys of the participating validators.
    pub pubkeys: Vec<String>,
}

impl KeygenRequest {
    pub fn new(block_number: u64, pubkeys: Vec<String>) -> Self {
        Self {
            block_number,
            pubkeys,
        }
    }

    /// Whether the ceremony should start at the observed ledger height.
    ///
    /// Only the exact height counts; a request observed late is left alone.
    pub fn is_due_at(&self, ledger_height: u64) -> bool {
        self.block_number == ledger_height
    }
}
