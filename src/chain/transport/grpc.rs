use std::time::Duration;

use async_trait::async_trait;
use cosmos_sdk_proto::cosmos::auth::v1beta1::query_client::QueryClient as AuthQueryClient;
use cosmos_sdk_proto::cosmos::auth::v1beta1::QueryAccountRequest;
use cosmos_sdk_proto::cosmos::bank::v1beta1::query_client::QueryClient as BankQueryClient;
use cosmos_sdk_proto::cosmos::bank::v1beta1::QueryAllBalancesRequest;
use cosmos_sdk_proto::cosmos::base::query::v1beta1::PageRequest;
use cosmos_sdk_proto::cosmos::base::tendermint::v1beta1::service_client::ServiceClient as TendermintServiceClient;
use cosmos_sdk_proto::cosmos::base::tendermint::v1beta1::GetLatestBlockRequest;
use cosmos_sdk_proto::cosmos::tx::v1beta1::service_client::ServiceClient as TxServiceClient;
use cosmos_sdk_proto::cosmos::tx::v1beta1::{BroadcastMode, BroadcastTxRequest, SimulateRequest};
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};

use super::{collect_pages, decode_account, NodeTransport};
use crate::chain::error::{ClientError, ClientResult, TransportError};
use crate::chain::types::{AccountInfo, Balance, BroadcastResponse, GasEstimate};

const BLOCK_HEIGHT_HEADER: &str = "x-cosmos-block-height";

/// Binary transport over the node's gRPC endpoint.
///
/// The channel is optional: if the initial connect fails every call answers
/// `NotConnected` and the query client moves on to the next transport.
#[derive(Debug, Clone)]
pub struct GrpcTransport {
    endpoint: String,
    channel: Option<Channel>,
}

impl GrpcTransport {
    /// Connect to `endpoint`. A failed connect is logged and yields a
    /// disconnected transport rather than an error.
    pub async fn connect(endpoint: &str, timeout: Duration) -> ClientResult<Self> {
        let configured = Self::endpoint(endpoint, timeout)?;

        log::info!("Connecting to gRPC endpoint {}", endpoint);
        let channel = match configured.connect().await {
            Ok(channel) => {
                log::info!("Connected to gRPC endpoint {}", endpoint);
                Some(channel)
            }
            Err(e) => {
                log::warn!("gRPC endpoint {} unavailable, REST only: {}", endpoint, e);
                None
            }
        };

        Ok(Self {
            endpoint: endpoint.to_string(),
            channel,
        })
    }

    /// A transport that never connected; every call fails with `NotConnected`.
    pub fn disconnected(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            channel: None,
        }
    }

    fn endpoint(endpoint: &str, timeout: Duration) -> ClientResult<Endpoint> {
        let mut configured = Endpoint::from_shared(endpoint.to_string())
            .map_err(|e| ClientError::Config(format!("invalid gRPC endpoint {}: {}", endpoint, e)))?
            .timeout(timeout)
            .connect_timeout(timeout);

        if endpoint.starts_with("https://") {
            configured = configured
                .tls_config(ClientTlsConfig::new())
                .map_err(|e| ClientError::Config(format!("TLS setup for {} failed: {}", endpoint, e)))?;
        }
        Ok(configured)
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint
    }

    fn channel(&self) -> Result<Channel, TransportError> {
        self.channel.clone().ok_or(TransportError::NotConnected)
    }
}

#[async_trait]
impl NodeTransport for GrpcTransport {
    fn name(&self) -> &'static str {
        "grpc"
    }

    async fn latest_height(&self) -> Result<u64, TransportError> {
        let mut client = TendermintServiceClient::new(self.channel()?);
        let response = client.get_latest_block(GetLatestBlockRequest {}).await?;

        // Gateway nodes stamp every response with the height it was served at
        if let Some(value) = response.metadata().get(BLOCK_HEIGHT_HEADER) {
            if let Some(height) = value.to_str().ok().and_then(|s| s.parse::<u64>().ok()) {
                return Ok(height);
            }
        }

        let height = response
            .into_inner()
            .block
            .and_then(|block| block.header)
            .map(|header| header.height)
            .ok_or_else(|| TransportError::Decode("latest block without header".to_string()))?;

        u64::try_from(height)
            .map_err(|_| TransportError::Decode(format!("negative block height {}", height)))
    }

    async fn all_balances(&self, address: &str) -> Result<Vec<Balance>, TransportError> {
        let client = BankQueryClient::new(self.channel()?);

        collect_pages(|key: Option<Vec<u8>>| {
            let mut client = client.clone();
            let request = QueryAllBalancesRequest {
                address: address.to_string(),
                pagination: Some(PageRequest {
                    key: key.unwrap_or_default(),
                    ..Default::default()
                }),
                ..Default::default()
            };
            async move {
                let page = client.all_balances(request).await?.into_inner();
                let balances = page
                    .balances
                    .into_iter()
                    .map(|coin| Balance {
                        denom: coin.denom,
                        amount: coin.amount,
                    })
                    .collect();
                Ok((balances, page.pagination.map(|p| p.next_key)))
            }
        })
        .await
    }

    async fn account(&self, address: &str) -> Result<AccountInfo, TransportError> {
        let mut client = AuthQueryClient::new(self.channel()?);
        let response = client
            .account(QueryAccountRequest {
                address: address.to_string(),
            })
            .await?
            .into_inner();

        let any = response
            .account
            .ok_or_else(|| TransportError::NotFound(format!("account {}", address)))?;
        log::debug!("Decoding account with type_url: {}", any.type_url);
        decode_account(&any)
    }

    async fn simulate(&self, tx_bytes: &[u8]) -> Result<GasEstimate, TransportError> {
        let mut client = TxServiceClient::new(self.channel()?);
        #[allow(deprecated)]
        let request = SimulateRequest {
            tx_bytes: tx_bytes.to_vec(),
            ..Default::default()
        };
        let response = client.simulate(request).await?.into_inner();

        let gas_info = response
            .gas_info
            .ok_or_else(|| TransportError::Decode("no gas info in simulation response".to_string()))?;

        Ok(GasEstimate {
            gas_wanted: gas_info.gas_wanted,
            gas_used: gas_info.gas_used,
        })
    }

    async fn broadcast(&self, tx_bytes: &[u8]) -> Result<BroadcastResponse, TransportError> {
        let mut client = TxServiceClient::new(self.channel()?);
        let request = BroadcastTxRequest {
            tx_bytes: tx_bytes.to_vec(),
            mode: BroadcastMode::Sync as i32,
        };
        let tx_response = client
            .broadcast_tx(request)
            .await?
            .into_inner()
            .tx_response
            .ok_or_else(|| TransportError::Decode("no tx response in broadcast response".to_string()))?;

        Ok(BroadcastResponse {
            tx_hash: tx_response.txhash,
            code: tx_response.code,
            raw_log: tx_response.raw_log,
            gas_wanted: u64::try_from(tx_response.gas_wanted).unwrap_or(0),
            gas_used: u64::try_from(tx_response.gas_used).unwrap_or(0),
        })
    }
}
