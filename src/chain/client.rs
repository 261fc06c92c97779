use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::chain::address::validate_address;
use crate::chain::error::{ClientError, ClientResult, TransportError};
use crate::chain::transport::{GrpcTransport, HistoryTransport, NodeTransport, RestTransport};
use crate::chain::types::{AccountInfo, BalanceSet, Block, BroadcastResponse, GasEstimate, NodeInfo, Transaction};
use crate::config::Config;

type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, TransportError>> + Send + 'a>>;

/// How far a failed call may fall through the transport list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Policy {
    /// Any failure moves on to the next transport.
    ReadOnly,
    /// Like `ReadOnly`, but a NotFound answer is final.
    Lookup,
    /// Only a request that never left the process moves on.
    SubmitOnce,
}

#[derive(Debug)]
enum CallError {
    Definitive(TransportError),
    Exhausted(String),
}

/// Read-side client for a single node.
///
/// Built once with its transports and shared by reference; holds no mutable
/// state, so queries may run concurrently.
pub struct ChainQueryClient {
    transports: Vec<Arc<dyn NodeTransport>>,
    history: Arc<dyn HistoryTransport>,
    address_prefix: String,
}

impl ChainQueryClient {
    /// gRPC first, REST second. A gRPC endpoint that is down at startup only
    /// costs a warning; every call then goes straight to REST.
    pub async fn connect(config: &Config) -> ClientResult<Self> {
        let timeout = config.network.timeout();

        let grpc: Arc<dyn NodeTransport> =
            Arc::new(GrpcTransport::connect(&config.chain.rpc_endpoint, timeout).await?);
        let rest = Arc::new(RestTransport::new(&config.chain.rest_endpoint, timeout)?);
        let rest_node: Arc<dyn NodeTransport> = rest.clone();

        Ok(Self::with_transports(
            vec![grpc, rest_node],
            rest,
            &config.chain.address_prefix,
        ))
    }

    pub fn with_transports(
        transports: Vec<Arc<dyn NodeTransport>>,
        history: Arc<dyn HistoryTransport>,
        address_prefix: &str,
    ) -> Self {
        Self {
            transports,
            history,
            address_prefix: address_prefix.to_string(),
        }
    }

    pub fn address_prefix(&self) -> &str {
        &self.address_prefix
    }

    async fn call_in_order<'a, T, F>(&'a self, op: &str, policy: Policy, call: F) -> Result<T, CallError>
    where
        F: Fn(&'a dyn NodeTransport) -> TransportFuture<'a, T>,
    {
        let mut failures = Vec::new();

        for transport in &self.transports {
            match call(transport.as_ref()).await {
                Ok(value) => {
                    if !failures.is_empty() {
                        log::debug!("{} served by {} after fallback", op, transport.name());
                    }
                    return Ok(value);
                }
                Err(e) if policy == Policy::Lookup && e.is_definitive() => {
                    return Err(CallError::Definitive(e));
                }
                Err(e) => {
                    log::warn!("{} via {} failed: {}", op, transport.name(), e);
                    let fall_through = match policy {
                        Policy::ReadOnly | Policy::Lookup => true,
                        Policy::SubmitOnce => e.is_unsent(),
                    };
                    failures.push(format!("{}: {}", transport.name(), e));
                    if !fall_through {
                        break;
                    }
                }
            }
        }

        if failures.is_empty() {
            failures.push("no transport configured".to_string());
        }
        Err(CallError::Exhausted(format!("{} failed ({})", op, failures.join("; "))))
    }

    /// Latest committed height, from the first transport that answers.
    pub async fn latest_height(&self) -> ClientResult<u64> {
        self.call_in_order("latest_height", Policy::ReadOnly, |t| t.latest_height())
            .await
            .map_err(unexpected)
    }

    pub async fn block_at(&self, height: u64) -> ClientResult<Block> {
        self.history.block_at(height).await.map_err(|e| match e {
            TransportError::NotFound(_) => ClientError::BlockNotFound(height),
            other => history_error("block_at", other),
        })
    }

    pub async fn latest_block(&self) -> ClientResult<Block> {
        let height = self.latest_height().await?;
        self.block_at(height).await
    }

    /// All balances of `address`. An address holding nothing yields an empty
    /// set.
    pub async fn balances_of(&self, address: &str) -> ClientResult<BalanceSet> {
        validate_address(address, &self.address_prefix)?;

        match self
            .call_in_order("balances", Policy::Lookup, |t| t.all_balances(address))
            .await
        {
            Ok(balances) => Ok(balances.into_iter().collect()),
            Err(CallError::Definitive(_)) => Ok(BalanceSet::new()),
            Err(e) => Err(unexpected(e)),
        }
    }

    pub async fn transaction_by_hash(&self, hash: &str) -> ClientResult<Transaction> {
        if hash.is_empty() {
            return Err(ClientError::TransactionNotFound(String::new()));
        }
        self.history.transaction_by_hash(hash).await.map_err(|e| match e {
            TransportError::NotFound(_) => ClientError::TransactionNotFound(hash.to_string()),
            other => history_error("transaction_by_hash", other),
        })
    }

    /// Account number and sequence. An address the node has never seen is a
    /// fresh account at sequence 0.
    pub async fn account(&self, address: &str) -> ClientResult<AccountInfo> {
        validate_address(address, &self.address_prefix)?;

        match self
            .call_in_order("account", Policy::Lookup, |t| t.account(address))
            .await
        {
            Ok(info) => Ok(info),
            Err(CallError::Definitive(_)) => {
                log::debug!("Account {} not on chain yet, using sequence 0", address);
                Ok(AccountInfo {
                    address: address.to_string(),
                    ..Default::default()
                })
            }
            Err(e) => Err(unexpected(e)),
        }
    }

    pub async fn node_info(&self) -> ClientResult<NodeInfo> {
        self.history
            .node_info()
            .await
            .map_err(|e| history_error("node_info", e))
    }

    pub async fn check_connection(&self) -> bool {
        self.latest_height().await.is_ok()
    }

    /// Dry run; never changes chain state.
    pub async fn simulate(&self, tx_bytes: &[u8]) -> ClientResult<GasEstimate> {
        self.call_in_order("simulate", Policy::ReadOnly, |t| t.simulate(tx_bytes))
            .await
            .map_err(unexpected)
    }

    /// Submit signed bytes once. Falls through to the next transport only when
    /// the previous one never sent them.
    pub async fn broadcast(&self, tx_bytes: &[u8]) -> ClientResult<BroadcastResponse> {
        self.call_in_order("broadcast", Policy::SubmitOnce, |t| t.broadcast(tx_bytes))
            .await
            .map_err(unexpected)
    }

    /// Poll until `hash` is included or `timeout` elapses.
    pub async fn wait_for_transaction(
        &self,
        hash: &str,
        timeout: Duration,
        poll_interval: Duration,
    ) -> ClientResult<Transaction> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.transaction_by_hash(hash).await {
                Ok(tx) => return Ok(tx),
                Err(ClientError::TransactionNotFound(_)) => {
                    log::debug!("Transaction {} not included yet", hash);
                }
                Err(e) if e.is_retryable() => {
                    log::warn!("Polling for {} failed: {}", hash, e);
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ClientError::ConfirmationTimeout {
                    hash: hash.to_string(),
                });
            }
            tokio::time::sleep(poll_interval.min(deadline - now)).await;
        }
    }
}

/// A definitive answer where none was expected still means the node did not
/// give us what we asked for.
fn unexpected(err: CallError) -> ClientError {
    match err {
        CallError::Exhausted(context) => ClientError::ChainUnreachable(context),
        CallError::Definitive(e) => ClientError::ChainUnreachable(e.to_string()),
    }
}

fn history_error(op: &str, err: TransportError) -> ClientError {
    match err {
        TransportError::Decode(detail) => ClientError::MalformedResponse(format!("{}: {}", op, detail)),
        other => ClientError::ChainUnreachable(format!("{} via rest failed: {}", op, other)),
    }
}
