use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::chain::error::{ClientError, ClientResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub chain: ChainConfig,
    #[serde(default)]
    pub network: NetworkConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: String,
    #[serde(default)]
    pub chain_name: String,
    /// gRPC endpoint, tried first for height, balances and broadcast
    pub rpc_endpoint: String,
    pub rest_endpoint: String,
    #[serde(default)]
    pub faucet_endpoint: Option<String>,
    pub address_prefix: String,
    pub coin_denom: String,
    pub coin_minimal_denom: String,
    pub coin_decimals: u32,
    pub gas_prices: GasPrices,
    pub gas_multiplier: f64,
}

/// Minimal units per unit of gas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GasPrices {
    pub low: f64,
    pub average: f64,
    pub high: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasPriceTier {
    Low,
    Average,
    High,
}

impl GasPrices {
    pub fn price(&self, tier: GasPriceTier) -> f64 {
        match tier {
            GasPriceTier::Low => self.low,
            GasPriceTier::Average => self.average,
            GasPriceTier::High => self.high,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub timeout_secs: u64,
    // Retry fields drive the caller's polling policy; the client never retries
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub confirm_timeout_secs: u64,
    pub confirm_poll_interval_ms: u64,
    pub poll_interval_secs: u64,
    pub balance_poll_interval_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            retries: 3,
            retry_delay_ms: 1000,
            confirm_timeout_secs: 60,
            confirm_poll_interval_ms: 3000,
            poll_interval_secs: 5,
            balance_poll_interval_secs: 10,
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn confirm_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirm_poll_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn balance_poll_interval(&self) -> Duration {
        Duration::from_secs(self.balance_poll_interval_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain: ChainConfig {
                chain_id: "aaa".to_string(),
                chain_name: "Local Test Chain".to_string(),
                rpc_endpoint: "http://localhost:9090".to_string(),
                rest_endpoint: "http://localhost:1317".to_string(),
                faucet_endpoint: Some("http://localhost:4500".to_string()),
                address_prefix: "cosmos".to_string(),
                coin_denom: "stake".to_string(),
                coin_minimal_denom: "ustake".to_string(),
                coin_decimals: 6,
                gas_prices: GasPrices {
                    low: 0.01,
                    average: 0.025,
                    high: 0.04,
                },
                gas_multiplier: 1.3,
            },
            network: NetworkConfig::default(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> ClientResult<()> {
        let chain = &self.chain;
        if chain.chain_id.is_empty() {
            return Err(ClientError::Config("chain_id is empty".to_string()));
        }
        if chain.address_prefix.is_empty() {
            return Err(ClientError::Config("address_prefix is empty".to_string()));
        }
        if chain.coin_minimal_denom.is_empty() {
            return Err(ClientError::Config("coin_minimal_denom is empty".to_string()));
        }
        if chain.rpc_endpoint.is_empty() || chain.rest_endpoint.is_empty() {
            return Err(ClientError::Config("rpc_endpoint and rest_endpoint are required".to_string()));
        }
        let prices = chain.gas_prices;
        if [prices.low, prices.average, prices.high].iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(ClientError::Config(format!("gas prices must be positive: {:?}", prices)));
        }
        if !chain.gas_multiplier.is_finite() || chain.gas_multiplier < 1.0 {
            return Err(ClientError::Config(format!(
                "gas_multiplier must be at least 1.0, got {}",
                chain.gas_multiplier
            )));
        }
        if self.network.timeout_secs == 0 {
            return Err(ClientError::Config("timeout_secs must be positive".to_string()));
        }
        if self.network.confirm_poll_interval_ms == 0 {
            return Err(ClientError::Config("confirm_poll_interval_ms must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_local_test_chain() {
        let config = Config::default();
        assert_eq!(config.chain.chain_id, "aaa");
        assert_eq!(config.chain.address_prefix, "cosmos");
        assert_eq!(config.chain.coin_minimal_denom, "ustake");
        assert_eq!(config.chain.coin_decimals, 6);
        assert_eq!(config.chain.gas_prices.price(GasPriceTier::Average), 0.025);
        assert_eq!(config.network.timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip_through_file() {
        let path = std::env::temp_dir().join(format!("stakewallet-config-{}.toml", std::process::id()));
        let mut config = Config::default();
        config.chain.chain_id = "testnet-2".to_string();
        config.chain.faucet_endpoint = None;

        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_network_section_is_optional() {
        let text = r#"
            [chain]
            chain_id = "aaa"
            rpc_endpoint = "http://localhost:9090"
            rest_endpoint = "http://localhost:1317"
            address_prefix = "cosmos"
            coin_denom = "stake"
            coin_minimal_denom = "ustake"
            coin_decimals = 6
            gas_multiplier = 1.3

            [chain.gas_prices]
            low = 0.01
            average = 0.025
            high = 0.04
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.network, NetworkConfig::default());
        assert_eq!(config.chain.faucet_endpoint, None);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.chain.address_prefix.clear();
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));

        let mut config = Config::default();
        config.chain.gas_multiplier = 0.9;
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));

        let mut config = Config::default();
        config.chain.gas_prices.average = 0.0;
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));

        let mut config = Config::default();
        config.network.timeout_secs = 0;
        assert!(matches!(config.validate(), Err(ClientError::Config(_))));
    }
}
