//! Configuration for the bridge observer that needs to be supplied externally by the validator
//! running it.

use std::{fs, io, path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use xbridge_primitives::chain::Chain;

/// Default value for `pending_poll_interval_ms` in [`ObserverConfig`].
const DEFAULT_PENDING_POLL_INTERVAL_MS: u64 = 12_000;

/// Default value for `keygen_poll_interval_ms` in [`ObserverConfig`].
const DEFAULT_KEYGEN_POLL_INTERVAL_MS: u64 = 2_000;

/// Default value for `sign_tick_ms` in [`ObserverConfig`].
const DEFAULT_SIGN_TICK_MS: u64 = 1_000;

/// Default value for `monitor_interval_ms` in [`ObserverConfig`].
const DEFAULT_MONITOR_INTERVAL_MS: u64 = DEFAULT_SIGN_TICK_MS;

/// Default value for `max_shepherds` in [`ObserverConfig`].
const DEFAULT_MAX_SHEPHERDS: usize = 32;

/// Default value for `schedule_cycle_secs` in [`ObserverConfig`].
const DEFAULT_SCHEDULE_CYCLE_SECS: u64 = 32;

/// Default value for `gas_limit` in [`ObserverConfig`].
const DEFAULT_GAS_LIMIT: u64 = 250_000;

/// Default value for `keygen_version` in [`ObserverConfig`].
const DEFAULT_KEYGEN_VERSION: &str = "0.14.0";

/// Top level observer config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserverConfig {
    /// How often the pending transfer list is fetched from the ledger.
    #[serde(default = "default_pending_poll_interval_ms")]
    pub pending_poll_interval_ms: u64,

    /// How often the ledger is checked for a keygen request.
    #[serde(default = "default_keygen_poll_interval_ms")]
    pub keygen_poll_interval_ms: u64,

    /// Tick of the per-transfer signing loop.
    #[serde(default = "default_sign_tick_ms")]
    pub sign_tick_ms: u64,

    /// How often an outbound transaction is checked for confirmation while a transfer is being
    /// shepherded. Bounds how long a shepherd keeps running after its transaction is confirmed,
    /// so it should not exceed `sign_tick_ms`.
    #[serde(default = "default_monitor_interval_ms")]
    pub monitor_interval_ms: u64,

    /// Number of transfers that may be shepherded at the same time.
    #[serde(default = "default_max_shepherds")]
    pub max_shepherds: usize,

    /// Length in seconds of the cycle over which sign attempts for different transfers are spread.
    #[serde(default = "default_schedule_cycle_secs")]
    pub schedule_cycle_secs: u64,

    /// Gas limit of outbound transactions.
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,

    /// Protocol version sent along with keygen ceremony requests.
    #[serde(default = "default_keygen_version")]
    pub keygen_version: String,

    /// Retry policy of the keygen ceremony.
    #[serde(default)]
    pub keygen_retry: KeygenRetryConfig,

    /// Destination chains that the group key is published to and that outbound transactions are
    /// signed for.
    #[serde(default = "default_chains")]
    pub chains: Vec<ChainConfig>,
}

/// Per destination chain settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub name: Chain,

    /// Numeric chain id, passed to the signer as the source chain id of transfers from this chain.
    pub chain_id: u64,
}

/// Exponential backoff for a failed keygen ceremony.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeygenRetryConfig {
    /// Retries after the first attempt before giving up on a request.
    pub max_retries: u16,

    /// Delay before the first retry.
    pub base_delay_ms: u64,

    /// Delay multiplier in percent, e.g. `200` doubles the delay every retry.
    pub multiplier_pct: u64,

    /// Upper bound on a single delay.
    pub max_delay_ms: u64,
}

impl Default for KeygenRetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 2_000,
            multiplier_pct: 200,
            max_delay_ms: 60_000,
        }
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            pending_poll_interval_ms: DEFAULT_PENDING_POLL_INTERVAL_MS,
            keygen_poll_interval_ms: DEFAULT_KEYGEN_POLL_INTERVAL_MS,
            sign_tick_ms: DEFAULT_SIGN_TICK_MS,
            monitor_interval_ms: DEFAULT_MONITOR_INTERVAL_MS,
            max_shepherds: DEFAULT_MAX_SHEPHERDS,
            schedule_cycle_secs: DEFAULT_SCHEDULE_CYCLE_SECS,
            gas_limit: DEFAULT_GAS_LIMIT,
            keygen_version: default_keygen_version(),
            keygen_retry: KeygenRetryConfig::default(),
            chains: default_chains(),
        }
    }
}

impl ObserverConfig {
    /// Parse the config at the given path and produce the [`ObserverConfig`].
    pub fn load_from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> ConfigResult<Self> {
        let config = toml::from_str::<ObserverConfig>(contents)?;
        config.validate()?;

        Ok(config)
    }

    /// Checks that the values are usable. Configs built in code rather than parsed should be
    /// passed through this too.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_shepherds == 0 {
            return Err(ConfigError::Invalid("max_shepherds must be positive"));
        }
        if self.schedule_cycle_secs == 0 {
            return Err(ConfigError::Invalid("schedule_cycle_secs must be positive"));
        }
        if self.sign_tick_ms == 0 || self.monitor_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick intervals must be positive"));
        }
        if self.pending_poll_interval_ms == 0 || self.keygen_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll intervals must be positive"));
        }

        Ok(())
    }

    pub fn pending_poll_interval(&self) -> Duration {
        Duration::from_millis(self.pending_poll_interval_ms)
    }

    pub fn keygen_poll_interval(&self) -> Duration {
        Duration::from_millis(self.keygen_poll_interval_ms)
    }

    pub fn sign_tick(&self) -> Duration {
        Duration::from_millis(self.sign_tick_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    /// Names of the configured destination chains, in config order.
    pub fn destination_chains(&self) -> impl Iterator<Item = Chain> + '_ {
        self.chains.iter().map(|c| c.name)
    }

    /// Chain id of `chain`, if it's configured.
    pub fn chain_id(&self, chain: Chain) -> Option<u64> {
        self.chains
            .iter()
            .find(|c| c.name == chain)
            .map(|c| c.chain_id)
    }
}

fn default_pending_poll_interval_ms() -> u64 {
    DEFAULT_PENDING_POLL_INTERVAL_MS
}

fn default_keygen_poll_interval_ms() -> u64 {
    DEFAULT_KEYGEN_POLL_INTERVAL_MS
}

fn default_sign_tick_ms() -> u64 {
    DEFAULT_SIGN_TICK_MS
}

fn default_monitor_interval_ms() -> u64 {
    DEFAULT_MONITOR_INTERVAL_MS
}

fn default_max_shepherds() -> usize {
    DEFAULT_MAX_SHEPHERDS
}

fn default_schedule_cycle_secs() -> u64 {
    DEFAULT_SCHEDULE_CYCLE_SECS
}

fn default_gas_limit() -> u64 {
    DEFAULT_GAS_LIMIT
}

fn default_keygen_version() -> String {
    DEFAULT_KEYGEN_VERSION.to_string()
}

fn default_chains() -> Vec<ChainConfig> {
    vec![
        ChainConfig {
            name: Chain::Eth,
            chain_id: 1,
        },
        ChainConfig {
            name: Chain::Bsc,
            chain_id: 56,
        },
        ChainConfig {
            name: Chain::Polygon,
            chain_id: 137,
        },
    ]
}

/// Error while loading the config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O related error while reading config.
    #[error("error loading config file: {0}")]
    Io(#[from] io::Error),

    /// Error while parsing the provided config.
    #[error("invalid config data: {0}")]
    Malformed(#[from] toml::de::Error),

    /// The config parses but a value is out of range.
    #[error("invalid config value: {0}")]
    Invalid(&'static str),
}

/// Result of loading the config which may produce a [`ConfigError`].
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ObserverConfig::from_toml_str("").expect("empty config is valid");

        assert_eq!(config, ObserverConfig::default());
        assert_eq!(config.max_shepherds, 32);
        assert_eq!(config.pending_poll_interval(), Duration::from_secs(12));
        assert_eq!(config.keygen_poll_interval(), Duration::from_secs(2));
        assert_eq!(config.chain_id(Chain::Bsc), Some(56));
        assert_eq!(config.chain_id(Chain::Zeta), None);
        assert_eq!(config.monitor_interval(), config.sign_tick());
    }

    #[test]
    fn test_config_load() {
        let config_string = r#"
            pending_poll_interval_ms = 6000
            max_shepherds = 8
            gas_limit = 300000
            keygen_version = "0.15.0"

            [keygen_retry]
            max_retries = 2
            base_delay_ms = 100
            multiplier_pct = 150
            max_delay_ms = 1000

            [[chains]]
            name = "ETH"
            chain_id = 5

            [[chains]]
            name = "POLYGON"
            chain_id = 80001
        "#;

        let config = ObserverConfig::from_toml_str(config_string);
        assert!(
            config.is_ok(),
            "should be able to load TOML config but got: {:?}",
            config.err()
        );

        let config = config.unwrap();
        assert_eq!(config.pending_poll_interval_ms, 6000);
        assert_eq!(config.sign_tick_ms, DEFAULT_SIGN_TICK_MS);
        assert_eq!(config.max_shepherds, 8);
        assert_eq!(config.keygen_retry.max_retries, 2);
        assert_eq!(
            config.destination_chains().collect::<Vec<_>>(),
            vec![Chain::Eth, Chain::Polygon]
        );
        assert_eq!(config.chain_id(Chain::Polygon), Some(80001));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            ObserverConfig::from_toml_str("max_shepherds = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ObserverConfig::from_toml_str("[[chains]]\nname = \"SOL\"\nchain_id = 1"),
            Err(ConfigError::Malformed(_))
        ));
    }

    #[test]
    fn test_validate_config_built_in_code() {
        assert!(ObserverConfig::default().validate().is_ok());

        let zero_cycle = ObserverConfig {
            schedule_cycle_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            zero_cycle.validate(),
            Err(ConfigError::Invalid(_))
        ));

        let zero_tick = ObserverConfig {
            sign_tick_ms: 0,
            ..Default::default()
        };
        assert!(zero_tick.validate().is_err());
    }
}
