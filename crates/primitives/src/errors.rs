//! Errors during parsing of the primitives reported by the coordination ledger.

use thiserror::Error;

/// Parsing errors for ledger-reported values that the observer has to interpret.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The chain name is not one the bridge knows about.
    #[error("unknown chain: {0}")]
    UnknownChain(String),

    /// The transfer identifier is not a `0x`-prefixed 32-byte hex hash.
    #[error("invalid transfer hash: {0}")]
    InvalidHash(String),

    /// A field expected to hold an unsigned decimal integer holds something else.
    #[error("invalid decimal in {field}: {value:?}")]
    InvalidDecimal {
        /// Name of the offending field.
        field: &'static str,
        /// The raw value as reported.
        value: String,
    },

    /// The destination address could not be parsed.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}
