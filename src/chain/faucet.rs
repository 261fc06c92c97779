use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use crate::chain::address::validate_address;
use crate::chain::error::{ClientError, ClientResult};

#[derive(Debug, Serialize)]
struct FaucetRequest<'a> {
    address: &'a str,
}

/// Client for the test chain's unauthenticated faucet.
#[derive(Debug, Clone)]
pub struct FaucetClient {
    http: Client,
    endpoint: String,
    address_prefix: String,
}

impl FaucetClient {
    pub fn new(endpoint: &str, address_prefix: &str, timeout: Duration) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            address_prefix: address_prefix.to_string(),
        })
    }

    /// Ask the faucet to fund `address`.
    ///
    /// `Ok(true)` means the request was accepted, not that funds arrived.
    /// Network failures are logged and reported as `Ok(false)`; only a bad
    /// address is an error.
    pub async fn request_faucet(&self, address: &str) -> ClientResult<bool> {
        validate_address(address, &self.address_prefix)?;

        let request = FaucetRequest { address };
        match self.http.post(&self.endpoint).json(&request).send().await {
            Ok(response) if response.status().is_success() => {
                log::info!("Faucet accepted request for {}", address);
                Ok(true)
            }
            Ok(response) => {
                log::warn!("Faucet refused request for {}: HTTP {}", address, response.status());
                Ok(false)
            }
            Err(e) => {
                log::warn!("Faucet unreachable at {}: {}", self.endpoint, e);
                Ok(false)
            }
        }
    }
}
