use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::ParseError;

/// A chain connected through the bridge.
///
/// The ledger refers to chains by their upper-case names (`"ETH"`, `"BSC"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Chain {
    Eth,
    Bsc,
    Polygon,
    /// The coordination ledger's own chain.
    Zeta,
}

impl Chain {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Chain::Eth => "ETH",
            Chain::Bsc => "BSC",
            Chain::Polygon => "POLYGON",
            Chain::Zeta => "ZETA",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Chain {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ETH" => Ok(Chain::Eth),
            "BSC" => Ok(Chain::Bsc),
            "POLYGON" => Ok(Chain::Polygon),
            "ZETA" => Ok(Chain::Zeta),
            _ => Err(ParseError::UnknownChain(s.to_string())),
        }
    }
}
