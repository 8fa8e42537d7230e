//! Configuration management for the gasless faucet.

use crate::error::FaucetResult;
use alloy::primitives::{utils::parse_ether, Address, U256};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Longest cooldown accepted by [`FaucetConfig::validate`], one year.
pub const MAX_COOLDOWN_HOURS: u64 = 24 * 365;

/// Configuration for the faucet server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaucetConfig {
    /// HTTP server configuration
    pub http: HttpConfig,

    /// Ethereum blockchain configuration
    pub ethereum: EthereumConfig,

    /// Eligibility windows
    pub eligibility: EligibilityConfig,

    /// Global per-client request limit
    pub rate_limit: RateLimitConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Port to bind to
    pub port: u16,

    /// Address to bind to
    pub bind_address: String,
}

/// Ethereum blockchain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EthereumConfig {
    /// RPC endpoint URL
    pub rpc_url: String,

    /// Private key for the faucet wallet (hex string, `0x` prefix optional)
    pub private_key: String,

    /// ERC-20 contract whose holders are eligible
    pub gating_token_address: String,

    /// Amount sent per disbursement, as a decimal ETH string (e.g. "0.1")
    pub disbursement_amount_eth: String,

    /// Addresses holding at least this many whole ETH are turned away
    pub min_sufficient_balance_eth: u64,

    /// Upper bound for any single RPC call, in seconds
    pub request_timeout_secs: u64,
}

/// Freshness and cooldown windows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityConfig {
    /// Maximum age of a client timestamp, in seconds
    pub freshness_window_secs: u64,

    /// Minimum time between two disbursements to one address, in hours
    pub cooldown_hours: u64,
}

/// Global rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per client IP per minute, across all routes
    pub requests_per_minute: u32,
}

impl Default for FaucetConfig {
    fn default() -> Self {
        Self {
            http: HttpConfig {
                port: 3030,
                bind_address: "127.0.0.1".to_string(),
            },
            ethereum: EthereumConfig {
                rpc_url: "https://rpc.sepolia.org".to_string(),
                private_key: "your_private_key_here".to_string(),
                gating_token_address: "0x0000000000000000000000000000000000000000".to_string(),
                disbursement_amount_eth: "0.1".to_string(),
                min_sufficient_balance_eth: 2,
                request_timeout_secs: 10,
            },
            eligibility: EligibilityConfig {
                freshness_window_secs: 30,
                cooldown_hours: 1,
            },
            rate_limit: RateLimitConfig {
                requests_per_minute: 5,
            },
        }
    }
}

impl EthereumConfig {
    /// Disbursement amount in wei
    pub fn disbursement_amount(&self) -> anyhow::Result<U256> {
        let amount = parse_ether(&self.disbursement_amount_eth).map_err(|e| {
            anyhow::anyhow!("Invalid disbursement amount '{}': {}", self.disbursement_amount_eth, e)
        })?;
        Ok(amount)
    }

    /// Parsed gating token contract address
    pub fn gating_token(&self) -> anyhow::Result<Address> {
        Address::from_str(&self.gating_token_address).map_err(|e| {
            anyhow::anyhow!("Invalid gating token address '{}': {}", self.gating_token_address, e)
        })
    }
}

impl FaucetConfig {
    /// Load configuration from a TOML file, with `FAUCET_` environment overrides
    ///
    /// Nested keys use a double underscore, e.g. `FAUCET_ETHEREUM__PRIVATE_KEY`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> FaucetResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("FAUCET")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ethereum.private_key == "your_private_key_here" {
            return Err(anyhow::anyhow!("Private key must be configured"));
        }

        let private_key = self
            .ethereum
            .private_key
            .strip_prefix("0x")
            .unwrap_or(&self.ethereum.private_key);
        if private_key.len() != 64 || !private_key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(anyhow::anyhow!("Private key must be 64 hex characters"));
        }

        if self.ethereum.disbursement_amount()?.is_zero() {
            return Err(anyhow::anyhow!("Disbursement amount must be positive"));
        }

        if self.ethereum.gating_token()?.is_zero() {
            return Err(anyhow::anyhow!("Gating token address must be configured"));
        }

        if self.ethereum.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Request timeout must be greater than 0"));
        }

        if self.eligibility.freshness_window_secs == 0 {
            return Err(anyhow::anyhow!("Freshness window must be greater than 0"));
        }

        if self.eligibility.cooldown_hours == 0 {
            return Err(anyhow::anyhow!("Cooldown must be greater than 0"));
        }

        if self.eligibility.cooldown_hours > MAX_COOLDOWN_HOURS {
            return Err(anyhow::anyhow!(
                "Cooldown must not exceed {} hours",
                MAX_COOLDOWN_HOURS
            ));
        }

        if self.rate_limit.requests_per_minute == 0 {
            return Err(anyhow::anyhow!("Rate limit must allow at least one request per minute"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_TOKEN: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    fn configured() -> FaucetConfig {
        let mut config = FaucetConfig::default();
        config.ethereum.private_key = TEST_KEY.to_string();
        config.ethereum.gating_token_address = TEST_TOKEN.to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = FaucetConfig::default();

        assert_eq!(config.http.port, 3030);
        assert_eq!(config.http.bind_address, "127.0.0.1");
        assert_eq!(config.ethereum.disbursement_amount_eth, "0.1");
        assert_eq!(config.eligibility.freshness_window_secs, 30);
        assert_eq!(config.eligibility.cooldown_hours, 1);
        assert_eq!(config.rate_limit.requests_per_minute, 5);
    }

    #[test]
    fn test_disbursement_amount_is_exact() {
        let config = FaucetConfig::default();
        assert_eq!(
            config.ethereum.disbursement_amount().unwrap(),
            U256::from(100_000_000_000_000_000u64)
        );
    }

    #[test]
    fn test_config_serialization() {
        let config = FaucetConfig::default();

        let serialized = toml::to_string(&config).unwrap();
        let deserialized: FaucetConfig = toml::from_str(&serialized).unwrap();

        assert_eq!(config.http.port, deserialized.http.port);
        assert_eq!(
            config.ethereum.disbursement_amount_eth,
            deserialized.ethereum.disbursement_amount_eth
        );
        assert_eq!(
            config.eligibility.cooldown_hours,
            deserialized.eligibility.cooldown_hours
        );
    }

    #[test]
    fn test_config_from_file() -> anyhow::Result<()> {
        let toml_content = r#"
[http]
port = 8080
bind_address = "0.0.0.0"

[ethereum]
rpc_url = "https://mainnet.infura.io/v3/key"
private_key = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80"
gating_token_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
disbursement_amount_eth = "0.05"
min_sufficient_balance_eth = 1
request_timeout_secs = 5

[eligibility]
freshness_window_secs = 60
cooldown_hours = 24

[rate_limit]
requests_per_minute = 10
"#;

        let temp_dir = tempfile::tempdir()?;
        let temp_path = temp_dir.path().join("test_config.toml");
        std::fs::write(&temp_path, toml_content)?;

        let config = FaucetConfig::from_file(&temp_path)?;

        assert_eq!(config.http.port, 8080);
        assert_eq!(config.http.bind_address, "0.0.0.0");
        assert_eq!(config.ethereum.min_sufficient_balance_eth, 1);
        assert_eq!(config.eligibility.freshness_window_secs, 60);
        assert_eq!(config.eligibility.cooldown_hours, 24);
        assert_eq!(config.rate_limit.requests_per_minute, 10);
        assert!(config.validate().is_ok());

        Ok(())
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = FaucetConfig::from_file(temp_dir.path().join("absent.toml"));

        assert!(matches!(result, Err(crate::error::FaucetError::ConfigError(_))));
    }

    #[test]
    fn test_config_validation() {
        let mut config = FaucetConfig::default();

        // Placeholder key and token
        assert!(config.validate().is_err());

        config.ethereum.private_key = TEST_KEY.to_string();
        assert!(config.validate().is_err());

        config.ethereum.gating_token_address = TEST_TOKEN.to_string();
        assert!(config.validate().is_ok());

        config.ethereum.private_key = format!("0x{}", TEST_KEY);
        assert!(config.validate().is_ok());

        config.ethereum.private_key = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_amounts_rejected() {
        let mut config = configured();
        config.ethereum.disbursement_amount_eth = "0".to_string();
        assert!(config.validate().is_err());

        config.ethereum.disbursement_amount_eth = "a lot".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_windows_rejected() {
        let mut config = configured();
        config.eligibility.freshness_window_secs = 0;
        assert!(config.validate().is_err());

        let mut config = configured();
        config.eligibility.cooldown_hours = 0;
        assert!(config.validate().is_err());

        let mut config = configured();
        config.eligibility.cooldown_hours = MAX_COOLDOWN_HOURS + 1;
        assert!(config.validate().is_err());

        let mut config = configured();
        config.eligibility.cooldown_hours = MAX_COOLDOWN_HOURS;
        assert!(config.validate().is_ok());

        let mut config = configured();
        config.rate_limit.requests_per_minute = 0;
        assert!(config.validate().is_err());

        let mut config = configured();
        config.ethereum.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_gating_token_rejected() {
        let mut config = configured();
        config.ethereum.gating_token_address = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load_config() -> anyhow::Result<()> {
        let mut config = configured();
        config.http.port = 8080;

        let temp_dir = tempfile::tempdir()?;
        let temp_path = temp_dir.path().join("test_save_config.toml");
        config.save_to_file(&temp_path)?;

        let loaded_config = FaucetConfig::from_file(&temp_path)?;

        assert_eq!(config.http.port, loaded_config.http.port);
        assert_eq!(config.ethereum.private_key, loaded_config.ethereum.private_key);
        assert_eq!(
            config.ethereum.gating_token_address,
            loaded_config.ethereum.gating_token_address
        );

        Ok(())
    }
}
