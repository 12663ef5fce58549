//! Coordinator configuration.
//!
//! Read from `$ORA_BOT_CONFIG`, else `$ORA_DATA_DIR/bot.toml`, else
//! `~/.ora/bot.toml`. A missing file yields the defaults. The
//! `AUTO_SLASH` environment variable overrides `bot.auto_slash`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ora_types::{ora, Address, Amount};
use serde::{Deserialize, Serialize};

use crate::{BotError, Result};

/// Key of the fallback entry in `[nodes]`.
pub const DEFAULT_NODE_KEY: &str = "default";

/// Complete coordinator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BotConfig {
    /// Loop settings.
    #[serde(default)]
    pub bot: LoopConfig,
    /// Development ledger settings.
    #[serde(default)]
    pub chain: ChainConfig,
    /// Per-node behaviour, keyed by address or `"default"`.
    #[serde(default)]
    pub nodes: HashMap<String, NodeBehavior>,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Cycle loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Delay between cycles.
    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,
    /// Settle delay before claiming rewards.
    #[serde(default = "default_claim_delay_ms")]
    pub claim_delay_ms: u64,
    /// Upper bound on waiting for any single acknowledgement.
    #[serde(default = "default_receipt_timeout_ms")]
    pub receipt_timeout_ms: u64,
    /// Slash outliers of the previous bucket automatically.
    #[serde(default)]
    pub auto_slash: bool,
    /// Cold-start price used until the oracle has a finalized median.
    #[serde(default = "default_initial_price")]
    pub initial_price: u64,
    /// Number of node identities the bot manages.
    #[serde(default = "default_node_count")]
    pub node_count: usize,
    /// Stake per node at registration, in whole ORA.
    #[serde(default = "default_stake_ora")]
    pub default_stake_ora: u64,
    /// Fixed RNG seed for reproducible runs.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Development ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Block production interval.
    #[serde(default = "default_block_interval_ms")]
    pub block_interval_ms: u64,
    /// Heights per bucket.
    #[serde(default = "default_bucket_window")]
    pub bucket_window: u64,
    /// ORA minted to the funding identity at genesis, in whole ORA.
    #[serde(default = "default_genesis_supply_ora")]
    pub genesis_supply_ora: u64,
}

/// How a single node behaves when reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeBehavior {
    /// Chance in `[0, 1]` of skipping a bucket.
    #[serde(default)]
    pub probability_of_skipping_report: f64,
    /// Relative noise bound in `[0, 1]` applied to the base price.
    #[serde(default)]
    pub price_variance: f64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions

fn default_cycle_interval_ms() -> u64 {
    12_000
}

fn default_claim_delay_ms() -> u64 {
    2_000
}

fn default_receipt_timeout_ms() -> u64 {
    30_000
}

fn default_initial_price() -> u64 {
    4_000
}

fn default_node_count() -> usize {
    10
}

fn default_stake_ora() -> u64 {
    500
}

fn default_block_interval_ms() -> u64 {
    1_000
}

fn default_bucket_window() -> u64 {
    ora_oracle::params::DEFAULT_BUCKET_WINDOW
}

fn default_genesis_supply_ora() -> u64 {
    1_000_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            cycle_interval_ms: default_cycle_interval_ms(),
            claim_delay_ms: default_claim_delay_ms(),
            receipt_timeout_ms: default_receipt_timeout_ms(),
            auto_slash: false,
            initial_price: default_initial_price(),
            node_count: default_node_count(),
            default_stake_ora: default_stake_ora(),
            seed: None,
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            block_interval_ms: default_block_interval_ms(),
            bucket_window: default_bucket_window(),
            genesis_supply_ora: default_genesis_supply_ora(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl LoopConfig {
    /// Delay between cycles.
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    /// Settle delay before claiming.
    pub fn claim_delay(&self) -> Duration {
        Duration::from_millis(self.claim_delay_ms)
    }

    /// Bound on any single acknowledgement wait.
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }

    /// Registration stake in base units.
    pub fn default_stake(&self) -> Amount {
        ora(u128::from(self.default_stake_ora))
    }
}

impl BotConfig {
    /// Load from the default location, applying environment overrides.
    ///
    /// Falls back to defaults if the file does not exist.
    ///
    /// # Errors
    ///
    /// - [`BotError::Io`] if the file exists but cannot be read
    /// - [`BotError::Config`] if it does not parse or validate
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path())?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from `path`; defaults if it does not exist.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load).
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate TOML text.
    ///
    /// # Errors
    ///
    /// - [`BotError::Config`] on malformed TOML, an unparseable node address,
    ///   or a probability/variance outside `[0, 1]`
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: BotConfig =
            toml::from_str(content).map_err(|e| BotError::Config(e.to_string()))?;
        config.normalize_node_keys()?;
        config.validate()?;
        Ok(config)
    }

    /// Behaviour for `node`: its own entry, else `"default"`, else no noise.
    pub fn behavior_for(&self, node: &Address) -> NodeBehavior {
        self.nodes
            .get(&node.to_string())
            .or_else(|| self.nodes.get(DEFAULT_NODE_KEY))
            .cloned()
            .unwrap_or_default()
    }

    /// Apply `AUTO_SLASH` if set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("AUTO_SLASH") {
            self.bot.auto_slash = parse_flag(&value);
        }
    }

    fn normalize_node_keys(&mut self) -> Result<()> {
        let mut normalized = HashMap::with_capacity(self.nodes.len());
        for (key, behavior) in self.nodes.drain() {
            let key = if key.eq_ignore_ascii_case(DEFAULT_NODE_KEY) {
                DEFAULT_NODE_KEY.to_string()
            } else {
                key.parse::<Address>()
                    .map_err(|e| BotError::Config(format!("node key {key:?}: {e}")))?
                    .to_string()
            };
            normalized.insert(key, behavior);
        }
        self.nodes = normalized;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (key, b) in &self.nodes {
            if !(0.0..=1.0).contains(&b.probability_of_skipping_report) {
                return Err(BotError::Config(format!(
                    "nodes.{key}: probability_of_skipping_report must be in [0, 1]"
                )));
            }
            if !(0.0..=1.0).contains(&b.price_variance) {
                return Err(BotError::Config(format!(
                    "nodes.{key}: price_variance must be in [0, 1]"
                )));
            }
        }
        if self.bot.initial_price == 0 {
            return Err(BotError::Config("bot.initial_price must be positive".to_string()));
        }
        if self.chain.bucket_window == 0 {
            return Err(BotError::Config("chain.bucket_window must be positive".to_string()));
        }
        Ok(())
    }

    /// Config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("ORA_BOT_CONFIG") {
            return PathBuf::from(path);
        }
        Self::data_dir().join("bot.toml")
    }

    /// Data directory: `$ORA_DATA_DIR`, else `~/.ora`.
    pub fn data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("ORA_DATA_DIR") {
            return PathBuf::from(dir);
        }
        std::env::var("HOME")
            .map(|h| PathBuf::from(h).join(".ora"))
            .unwrap_or_else(|_| PathBuf::from("/tmp/ora"))
    }
}

/// Truthy flag parsing: `1`, `true`, `yes`, `on` (case-insensitive).
pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BotConfig::default();
        assert_eq!(config.bot.cycle_interval_ms, 12_000);
        assert_eq!(config.bot.claim_delay_ms, 2_000);
        assert!(!config.bot.auto_slash);
        assert_eq!(config.bot.node_count, 10);
        assert_eq!(config.bot.default_stake(), ora(500));
        assert_eq!(config.chain.bucket_window, 24);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_serialization() {
        let config = BotConfig::default();
        let toml_str = toml::to_string(&config).expect("serialize");
        let _parsed = BotConfig::parse(&toml_str).expect("parse");
    }

    #[test]
    fn test_node_behaviors() {
        let node = Address::derive("node-3");
        let content = format!(
            r#"
            [bot]
            auto_slash = true

            [nodes.default]
            probability_of_skipping_report = 0.1
            price_variance = 0.01

            [nodes."{}"]
            price_variance = 0.5
            "#,
            node.to_string().to_uppercase().replacen("0X", "0x", 1)
        );
        let config = BotConfig::parse(&content).expect("parse");
        assert!(config.bot.auto_slash);
        assert_eq!(config.behavior_for(&node).price_variance, 0.5);
        assert_eq!(config.behavior_for(&node).probability_of_skipping_report, 0.0);
        let other = config.behavior_for(&Address::derive("node-4"));
        assert_eq!(other.probability_of_skipping_report, 0.1);
        assert_eq!(other.price_variance, 0.01);
    }

    #[test]
    fn test_behavior_without_default_entry() {
        let config = BotConfig::default();
        assert_eq!(
            config.behavior_for(&Address::derive("x")),
            NodeBehavior::default()
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            BotConfig::parse("[nodes.default]\nprice_variance = 1.5\n"),
            Err(BotError::Config(_))
        ));
        assert!(matches!(
            BotConfig::parse("[nodes.\"0x1234\"]\nprice_variance = 0.1\n"),
            Err(BotError::Config(_))
        ));
        assert!(matches!(
            BotConfig::parse("[bot]\ninitial_price = 0\n"),
            Err(BotError::Config(_))
        ));
        assert!(matches!(BotConfig::parse("not toml ["), Err(BotError::Config(_))));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config =
            BotConfig::load_from(Path::new("/nonexistent/ora/bot.toml")).expect("defaults");
        assert_eq!(config.bot.node_count, 10);
    }

    #[test]
    fn test_parse_flag() {
        for v in ["1", "true", "TRUE", "Yes", "on", " on "] {
            assert!(parse_flag(v), "{v}");
        }
        for v in ["", "0", "false", "off", "nope"] {
            assert!(!parse_flag(v), "{v}");
        }
    }
}
