use thiserror::Error;
use xbridge_config::ConfigError;
use xbridge_primitives::{chain::Chain, errors::ParseError};

/// Reasons a shepherd gives up on a transfer. The transfer stays pending on the ledger and is
/// picked up again by a later poll.
#[derive(Debug, Error)]
pub enum ShepherdError {
    #[error("malformed transfer: {0}")]
    Malformed(#[from] ParseError),

    #[error("no chain client for destination {0}")]
    UnsupportedChain(Chain),

    #[error("no chain id configured for source chain {0}")]
    UnknownSourceChain(Chain),
}

pub type ShepherdResult<T> = Result<T, ShepherdError>;

/// Errors of a single keygen ceremony attempt.
#[derive(Debug, Error)]
pub enum KeygenError {
    /// The threshold-signing service could not be reached or errored out.
    #[error("keygen ceremony errored: {0}")]
    Ceremony(anyhow::Error),

    /// The ceremony ran but the participants did not agree on a key.
    #[error("keygen ceremony failed: {reason} (blamed: {blame_nodes:?})")]
    Rejected {
        reason: String,
        blame_nodes: Vec<String>,
    },

    #[error("could not install group key: {0}")]
    SetPubKey(anyhow::Error),
}

/// Errors while setting up a [`CoreObserver`](crate::observer::CoreObserver).
#[derive(Debug, Error)]
pub enum InitError {
    #[error("invalid observer config: {0}")]
    Config(#[from] ConfigError),

    #[error("could not register metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}
