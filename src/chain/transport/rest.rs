use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{collect_pages, HistoryTransport, NodeTransport};
use crate::chain::error::{ClientError, ClientResult, TransportError};
use crate::chain::messages::DecodedMessage;
use crate::chain::types::{
    AccountInfo, Balance, Block, BroadcastResponse, EventAttribute, GasEstimate, NodeInfo,
    Transaction, TxEvent,
};

const LATEST_BLOCK_PATH: &str = "/cosmos/base/tendermint/v1beta1/blocks/latest";
const BLOCK_PATH: &str = "/cosmos/base/tendermint/v1beta1/blocks";
const NODE_INFO_PATH: &str = "/cosmos/base/tendermint/v1beta1/node_info";
const BALANCES_PATH: &str = "/cosmos/bank/v1beta1/balances";
const ACCOUNTS_PATH: &str = "/cosmos/auth/v1beta1/accounts";
const TXS_PATH: &str = "/cosmos/tx/v1beta1/txs";
const SIMULATE_PATH: &str = "/cosmos/tx/v1beta1/simulate";

/// gRPC status codes the gateway embeds in error bodies.
const GATEWAY_INVALID_ARGUMENT: i32 = 3;
const GATEWAY_NOT_FOUND: i32 = 5;

/// JSON transport over the node's REST gateway. Serves every query and is
/// the only source for historical blocks and transactions.
#[derive(Debug, Clone)]
pub struct RestTransport {
    http: Client,
    base_url: String,
}

impl RestTransport {
    pub fn new(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(request_error)?;
        read_json(response).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, TransportError> {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(request_error)?;
        read_json(response).await
    }
}

fn request_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        // Nothing reached the node
        TransportError::NotConnected
    } else {
        TransportError::Http(e)
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
    let status = response.status();
    let body = response.text().await.map_err(request_error)?;

    if !status.is_success() {
        return Err(classify_error(status.as_u16(), body));
    }
    Ok(serde_json::from_str(&body)?)
}

/// Error body written by the gRPC gateway.
#[derive(Debug, Deserialize)]
struct GatewayError {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

fn classify_error(status: u16, body: String) -> TransportError {
    let gateway = serde_json::from_str::<GatewayError>(&body).ok();

    match gateway {
        Some(err) if err.code == GATEWAY_NOT_FOUND => TransportError::NotFound(err.message),
        _ if status == 404 => TransportError::NotFound(body),
        _ => TransportError::Status { status, body },
    }
}

/// A height past the chain tip is reported as InvalidArgument, not NotFound.
fn block_lookup_error(err: TransportError) -> TransportError {
    match err {
        TransportError::Status { status, body } => {
            match serde_json::from_str::<GatewayError>(&body) {
                Ok(gw) if gw.code == GATEWAY_INVALID_ARGUMENT && gw.message.contains("height") => {
                    TransportError::NotFound(gw.message)
                }
                _ => TransportError::Status { status, body },
            }
        }
        other => other,
    }
}

// Wire shapes. Integers arrive as JSON strings.

#[derive(Debug, Deserialize)]
struct BlockResponse {
    #[serde(default)]
    block_id: Option<BlockId>,
    block: Option<BlockJson>,
}

#[derive(Debug, Deserialize)]
struct BlockId {
    #[serde(default)]
    hash: String,
}

#[derive(Debug, Deserialize)]
struct BlockJson {
    header: HeaderJson,
    #[serde(default)]
    data: Option<BlockData>,
}

#[derive(Debug, Deserialize)]
struct BlockData {
    #[serde(default)]
    txs: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct HeaderJson {
    height: String,
    time: String,
    #[serde(default)]
    proposer_address: String,
    #[serde(default)]
    data_hash: String,
    #[serde(default)]
    validators_hash: String,
    #[serde(default)]
    consensus_hash: String,
    #[serde(default)]
    app_hash: String,
    #[serde(default)]
    last_results_hash: String,
}

#[derive(Debug, Deserialize)]
struct BalancesResponse {
    #[serde(default)]
    balances: Vec<Balance>,
    #[serde(default)]
    pagination: Option<PaginationJson>,
}

#[derive(Debug, Deserialize)]
struct PaginationJson {
    #[serde(default)]
    next_key: Option<String>,
}

fn split_balance_page(page: BalancesResponse) -> (Vec<Balance>, Option<String>) {
    let next_key = page.pagination.and_then(|p| p.next_key);
    (page.balances, next_key)
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    account: Value,
}

#[derive(Debug, Serialize)]
struct TxBytesRequest<'a> {
    tx_bytes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SimulateResponse {
    gas_info: Option<GasInfoJson>,
}

#[derive(Debug, Deserialize)]
struct GasInfoJson {
    #[serde(default)]
    gas_wanted: String,
    #[serde(default)]
    gas_used: String,
}

#[derive(Debug, Deserialize)]
struct BroadcastResponseJson {
    tx_response: Option<TxResponseJson>,
}

#[derive(Debug, Deserialize)]
struct TxResponseJson {
    #[serde(default)]
    height: String,
    txhash: String,
    #[serde(default)]
    code: u32,
    #[serde(default)]
    raw_log: String,
    #[serde(default)]
    gas_wanted: String,
    #[serde(default)]
    gas_used: String,
    #[serde(default)]
    timestamp: String,
    #[serde(default)]
    events: Vec<EventJson>,
}

#[derive(Debug, Deserialize)]
struct EventJson {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    attributes: Vec<AttributeJson>,
}

#[derive(Debug, Deserialize)]
struct AttributeJson {
    #[serde(default)]
    key: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct GetTxResponse {
    #[serde(default)]
    tx: Option<TxJson>,
    tx_response: Option<TxResponseJson>,
}

#[derive(Debug, Deserialize)]
struct TxJson {
    #[serde(default)]
    body: Option<TxBodyJson>,
}

#[derive(Debug, Deserialize)]
struct TxBodyJson {
    #[serde(default)]
    messages: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct NodeInfoResponse {
    default_node_info: Option<DefaultNodeInfo>,
    #[serde(default)]
    application_version: Option<ApplicationVersion>,
}

#[derive(Debug, Deserialize)]
struct DefaultNodeInfo {
    #[serde(default)]
    network: String,
    #[serde(default)]
    moniker: String,
    #[serde(default)]
    version: String,
}

#[derive(Debug, Deserialize)]
struct ApplicationVersion {
    #[serde(default)]
    version: String,
}

fn parse_u64(raw: &str, field: &str) -> Result<u64, TransportError> {
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse::<u64>()
        .map_err(|_| TransportError::Decode(format!("{} is not an integer: {:?}", field, raw)))
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, TransportError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| TransportError::Decode(format!("bad timestamp {:?}: {}", raw, e)))
}

/// Base64 hash as the node's JSON renders it, to upper-case hex.
fn hash_to_hex(raw: &str) -> Result<String, TransportError> {
    let bytes = BASE64
        .decode(raw)
        .map_err(|e| TransportError::Decode(format!("bad base64 hash {:?}: {}", raw, e)))?;
    Ok(hex::encode_upper(bytes))
}

fn parse_block(response: BlockResponse) -> Result<Block, TransportError> {
    let block = response
        .block
        .ok_or_else(|| TransportError::Decode("block response without block".to_string()))?;
    let header = block.header;
    let hash = response.block_id.map(|id| id.hash).unwrap_or_default();

    Ok(Block {
        height: parse_u64(&header.height, "height")?,
        hash: hash_to_hex(&hash)?,
        timestamp: parse_time(&header.time)?,
        proposer_address: hash_to_hex(&header.proposer_address)?,
        tx_count: block.data.map(|d| d.txs.len()).unwrap_or(0),
        data_hash: hash_to_hex(&header.data_hash)?,
        validators_hash: hash_to_hex(&header.validators_hash)?,
        consensus_hash: hash_to_hex(&header.consensus_hash)?,
        app_hash: hash_to_hex(&header.app_hash)?,
        last_results_hash: hash_to_hex(&header.last_results_hash)?,
    })
}

fn parse_transaction(response: GetTxResponse) -> Result<Transaction, TransportError> {
    let tx_response = response
        .tx_response
        .ok_or_else(|| TransportError::Decode("transaction response without tx_response".to_string()))?;

    let messages = response
        .tx
        .and_then(|tx| tx.body)
        .map(|body| body.messages.iter().map(DecodedMessage::from_json).collect())
        .unwrap_or_default();

    let timestamp = match tx_response.timestamp.as_str() {
        "" => None,
        raw => Some(parse_time(raw)?),
    };

    Ok(Transaction {
        hash: tx_response.txhash,
        height: parse_u64(&tx_response.height, "height")?,
        result_code: tx_response.code,
        raw_log: tx_response.raw_log,
        gas_wanted: parse_u64(&tx_response.gas_wanted, "gas_wanted")?,
        gas_used: parse_u64(&tx_response.gas_used, "gas_used")?,
        timestamp,
        events: tx_response
            .events
            .into_iter()
            .map(|event| TxEvent {
                kind: event.kind,
                attributes: event
                    .attributes
                    .into_iter()
                    .map(|a| EventAttribute { key: a.key, value: a.value })
                    .collect(),
            })
            .collect(),
        messages,
    })
}

/// Number and sequence from the JSON account. Vesting and module accounts
/// nest the base account one or two levels down.
fn parse_account(account: &Value) -> Result<AccountInfo, TransportError> {
    let base = if account.get("account_number").is_some() {
        account
    } else if let Some(base) = account.get("base_account") {
        base
    } else if let Some(base) = account.pointer("/base_vesting_account/base_account") {
        base
    } else {
        let kind = account.get("@type").and_then(Value::as_str).unwrap_or("unknown");
        return Err(TransportError::Decode(format!("unsupported account type {}", kind)));
    };

    Ok(AccountInfo {
        address: str_field(base, "address").to_string(),
        account_number: parse_u64(str_field(base, "account_number"), "account_number")?,
        sequence: parse_u64(str_field(base, "sequence"), "sequence")?,
    })
}

fn str_field<'a>(value: &'a Value, name: &str) -> &'a str {
    value.get(name).and_then(Value::as_str).unwrap_or_default()
}

fn parse_node_info(response: NodeInfoResponse) -> Result<NodeInfo, TransportError> {
    let info = response
        .default_node_info
        .ok_or_else(|| TransportError::Decode("node info without default_node_info".to_string()))?;

    Ok(NodeInfo {
        network: info.network,
        moniker: info.moniker,
        version: info.version,
        app_version: response.application_version.map(|v| v.version).unwrap_or_default(),
    })
}

#[async_trait]
impl NodeTransport for RestTransport {
    fn name(&self) -> &'static str {
        "rest"
    }

    async fn latest_height(&self) -> Result<u64, TransportError> {
        let response: BlockResponse = self.get_json(LATEST_BLOCK_PATH, &[]).await?;
        let block = response
            .block
            .ok_or_else(|| TransportError::Decode("latest block response without block".to_string()))?;
        parse_u64(&block.header.height, "height")
    }

    async fn all_balances(&self, address: &str) -> Result<Vec<Balance>, TransportError> {
        let path = format!("{}/{}", BALANCES_PATH, address);
        let path = path.as_str();

        collect_pages(move |key: Option<String>| {
            let query: Vec<(&str, String)> = key
                .map(|key| vec![("pagination.key", key)])
                .unwrap_or_default();
            async move {
                let page: BalancesResponse = self.get_json(path, &query).await?;
                Ok(split_balance_page(page))
            }
        })
        .await
    }

    async fn account(&self, address: &str) -> Result<AccountInfo, TransportError> {
        let path = format!("{}/{}", ACCOUNTS_PATH, address);
        let response: AccountResponse = self.get_json(&path, &[]).await?;
        parse_account(&response.account)
    }

    async fn simulate(&self, tx_bytes: &[u8]) -> Result<GasEstimate, TransportError> {
        let request = TxBytesRequest {
            tx_bytes: BASE64.encode(tx_bytes),
            mode: None,
        };
        let response: SimulateResponse = self.post_json(SIMULATE_PATH, &request).await?;
        let gas_info = response
            .gas_info
            .ok_or_else(|| TransportError::Decode("no gas info in simulation response".to_string()))?;

        Ok(GasEstimate {
            gas_wanted: parse_u64(&gas_info.gas_wanted, "gas_wanted")?,
            gas_used: parse_u64(&gas_info.gas_used, "gas_used")?,
        })
    }

    async fn broadcast(&self, tx_bytes: &[u8]) -> Result<BroadcastResponse, TransportError> {
        let request = TxBytesRequest {
            tx_bytes: BASE64.encode(tx_bytes),
            mode: Some("BROADCAST_MODE_SYNC"),
        };
        let response: BroadcastResponseJson = self.post_json(TXS_PATH, &request).await?;
        let tx_response = response
            .tx_response
            .ok_or_else(|| TransportError::Decode("no tx response in broadcast response".to_string()))?;

        Ok(BroadcastResponse {
            tx_hash: tx_response.txhash,
            code: tx_response.code,
            raw_log: tx_response.raw_log,
            gas_wanted: parse_u64(&tx_response.gas_wanted, "gas_wanted")?,
            gas_used: parse_u64(&tx_response.gas_used, "gas_used")?,
        })
    }
}

#[async_trait]
impl HistoryTransport for RestTransport {
    async fn block_at(&self, height: u64) -> Result<Block, TransportError> {
        let path = format!("{}/{}", BLOCK_PATH, height);
        let response: BlockResponse = self.get_json(&path, &[]).await.map_err(block_lookup_error)?;
        parse_block(response)
    }

    async fn transaction_by_hash(&self, hash: &str) -> Result<Transaction, TransportError> {
        let path = format!("{}/{}", TXS_PATH, hash);
        let response: GetTxResponse = self.get_json(&path, &[]).await?;
        parse_transaction(response)
    }

    async fn node_info(&self) -> Result<NodeInfo, TransportError> {
        let response: NodeInfoResponse = self.get_json(NODE_INFO_PATH, &[]).await?;
        parse_node_info(response)
    }
}
