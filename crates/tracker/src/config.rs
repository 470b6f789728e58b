//! Configuration management for the tracker.
//!
//! This module handles loading configuration from:
//! - TOML files
//! - Environment variables via `${VAR_NAME}` placeholders
//! - Default values (fallbacks)

use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration for the tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Competition window and entry rules
    pub competition: CompetitionConfig,

    /// Upstream indexer endpoint
    pub indexer: IndexerConfig,

    /// Profile cache and avatar service
    #[serde(default)]
    pub profiles: ProfilesConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Competition window and entry rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitionConfig {
    /// Competition window start (unix seconds, inclusive)
    pub window_start: u64,

    /// Competition window end (unix seconds, inclusive)
    pub window_end: u64,

    /// Minimum qualifying entry amount, as a decimal wei-like string
    #[serde(default = "default_min_qualifying_amount")]
    pub min_qualifying_amount: String,

    /// Address entry transfers must be sent to
    pub collection_address: Address,

    /// Team/ops addresses excluded from the rankings
    #[serde(default)]
    pub excluded_addresses: Vec<Address>,
}

impl CompetitionConfig {
    /// The minimum qualifying amount as a U256.
    ///
    /// `validate()` guarantees the string parses, so this cannot fail on a
    /// validated config.
    pub fn min_amount(&self) -> Result<U256> {
        rally_core::types::parse_amount(&self.min_qualifying_amount)
            .with_context(|| format!("Invalid min_qualifying_amount: {}", self.min_qualifying_amount))
    }
}

/// Upstream indexer endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// JSON-RPC endpoint URL
    pub rpc_url: String,

    /// Page size for paginated history queries
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Polling interval in seconds for live subscriptions
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

/// Profile cache and avatar service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilesConfig {
    /// Profile cache database URL (e.g., "sqlite://profiles.db")
    #[serde(default = "default_profiles_database_url")]
    pub database_url: String,

    /// Avatar batch endpoint URL (fetches preview images by CID)
    #[serde(default = "default_avatar_batch_url")]
    pub batch_url: String,
}

impl Default for ProfilesConfig {
    fn default() -> Self {
        Self {
            database_url: default_profiles_database_url(),
            batch_url: default_avatar_batch_url(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_min_qualifying_amount() -> String {
    // 1 token in wei-like units
    "1000000000000000000".to_string()
}

fn default_page_size() -> usize {
    rally_core::constants::DEFAULT_PAGE_SIZE
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_profiles_database_url() -> String {
    "sqlite://profiles.db".to_string()
}

fn default_avatar_batch_url() -> String {
    "https://rpc.aboutcircles.com/profiles/getBatch".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables can be referenced using `${VAR_NAME}` syntax,
    /// for example: `rpc_url = "${INDEXER_RPC_URL}"`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let expanded = expand_env_vars(&contents)?;

        let config: Config = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml).context("Failed to parse TOML configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.competition.window_start >= self.competition.window_end {
            anyhow::bail!(
                "Competition window_start ({}) must be before window_end ({})",
                self.competition.window_start,
                self.competition.window_end
            );
        }

        if self.competition.collection_address.is_zero() {
            anyhow::bail!("Competition collection_address must be a non-zero address");
        }

        if rally_core::types::parse_amount(&self.competition.min_qualifying_amount).is_err() {
            anyhow::bail!(
                "Competition min_qualifying_amount must be a decimal integer string (got {:?})",
                self.competition.min_qualifying_amount
            );
        }

        if self.indexer.rpc_url.is_empty() {
            anyhow::bail!("Indexer rpc_url cannot be empty");
        }

        if self.indexer.page_size == 0 {
            anyhow::bail!("Indexer page_size must be > 0");
        }

        if self.indexer.poll_interval_secs == 0 {
            anyhow::bail!("Indexer poll_interval_secs must be > 0");
        }

        if self.profiles.database_url.is_empty() {
            anyhow::bail!("Profiles database_url cannot be empty");
        }

        if self.profiles.batch_url.is_empty() {
            anyhow::bail!("Profiles batch_url cannot be empty");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            anyhow::bail!(
                "Logging level must be one of: {} (got '{}')",
                valid_levels.join(", "),
                self.logging.level
            );
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            anyhow::bail!(
                "Logging format must be one of: {} (got '{}')",
                valid_formats.join(", "),
                self.logging.format
            );
        }

        Ok(())
    }
}

/// Expand `${VAR_NAME}` placeholders with environment variable values.
///
/// Unset variables are an error; an unclosed or empty placeholder is an
/// error too.
fn expand_env_vars(input: &str) -> Result<String> {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            anyhow::bail!("Unclosed environment variable placeholder");
        };
        let var_name = &after[..end];
        if var_name.is_empty() {
            anyhow::bail!("Empty environment variable name");
        }
        let value = std::env::var(var_name)
            .with_context(|| format!("Environment variable '{}' is not set", var_name))?;
        result.push_str(&value);
        rest = &after[end + 1..];
    }
    result.push_str(rest);

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
[competition]
window_start = 1747000000
window_end = 1750262400
min_qualifying_amount = "1000000000000000000"
collection_address = "0x1111111111111111111111111111111111111111"
excluded_addresses = ["0x2222222222222222222222222222222222222222"]

[indexer]
rpc_url = "https://rpc.example.com/"
page_size = 1000
poll_interval_secs = 10

[profiles]
database_url = "sqlite://profiles.db"

[logging]
level = "info"
format = "pretty"
    "#;

    #[test]
    fn test_load_example_config() {
        let config = Config::from_toml_str(EXAMPLE).unwrap();
        assert_eq!(config.competition.window_start, 1_747_000_000);
        assert_eq!(config.competition.excluded_addresses.len(), 1);
        assert_eq!(config.indexer.page_size, 1000);
        assert_eq!(
            config.competition.min_amount().unwrap(),
            U256::from(10).pow(U256::from(18))
        );
    }

    #[test]
    fn test_defaults_applied() {
        let toml = r#"
[competition]
window_start = 100
window_end = 200
collection_address = "0x1111111111111111111111111111111111111111"

[indexer]
rpc_url = "https://rpc.example.com/"
        "#;
        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.competition.min_qualifying_amount, "1000000000000000000");
        assert_eq!(config.indexer.page_size, 1000);
        assert_eq!(config.indexer.poll_interval_secs, 10);
        assert_eq!(config.profiles.database_url, "sqlite://profiles.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
        assert!(config.competition.excluded_addresses.is_empty());
    }

    #[test]
    fn test_validation_window_ordering() {
        let toml = r#"
[competition]
window_start = 200
window_end = 100
collection_address = "0x1111111111111111111111111111111111111111"

[indexer]
rpc_url = "https://rpc.example.com/"
        "#;
        let result = Config::from_toml_str(toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("window_start"));
    }

    #[test]
    fn test_validation_zero_collection_address() {
        let toml = r#"
[competition]
window_start = 100
window_end = 200
collection_address = "0x0000000000000000000000000000000000000000"

[indexer]
rpc_url = "https://rpc.example.com/"
        "#;
        let result = Config::from_toml_str(toml);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("collection_address"));
    }

    #[test]
    fn test_validation_bad_amount() {
        let toml = r#"
[competition]
window_start = 100
window_end = 200
min_qualifying_amount = "one token"
collection_address = "0x1111111111111111111111111111111111111111"

[indexer]
rpc_url = "https://rpc.example.com/"
        "#;
        let result = Config::from_toml_str(toml);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("min_qualifying_amount"));
    }

    #[test]
    fn test_validation_empty_rpc_url() {
        let toml = r#"
[competition]
window_start = 100
window_end = 200
collection_address = "0x1111111111111111111111111111111111111111"

[indexer]
rpc_url = ""
        "#;
        let result = Config::from_toml_str(toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("rpc_url"));
    }

    #[test]
    fn test_validation_bad_log_level() {
        let toml = r#"
[competition]
window_start = 100
window_end = 200
collection_address = "0x1111111111111111111111111111111111111111"

[indexer]
rpc_url = "https://rpc.example.com/"

[logging]
level = "loud"
        "#;
        let result = Config::from_toml_str(toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Logging level"));
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("RALLY_TEST_RPC", "https://rpc.example.com/");
        let expanded = expand_env_vars("rpc_url = \"${RALLY_TEST_RPC}\"").unwrap();
        assert_eq!(expanded, "rpc_url = \"https://rpc.example.com/\"");
        std::env::remove_var("RALLY_TEST_RPC");
    }

    #[test]
    fn test_expand_env_vars_undefined() {
        let result = expand_env_vars("value = \"${RALLY_UNDEFINED_VAR_123}\"");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("RALLY_UNDEFINED_VAR_123"));
    }

    #[test]
    fn test_expand_env_vars_unclosed_and_empty() {
        assert!(expand_env_vars("value = \"${UNCLOSED").is_err());
        assert!(expand_env_vars("value = \"${}\"").is_err());
    }

    #[test]
    fn test_mixed_case_addresses_parse() {
        let toml = r#"
[competition]
window_start = 100
window_end = 200
collection_address = "0xDE374ece6fA50e781E81Aac78e811b33D16912c7"

[indexer]
rpc_url = "https://rpc.example.com/"
        "#;
        let config = Config::from_toml_str(toml).unwrap();
        assert!(!config.competition.collection_address.is_zero());
    }
}
