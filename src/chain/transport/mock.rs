//! Scripted in-memory node used by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use cosmos_sdk_proto::cosmos::tx::v1beta1::{AuthInfo, TxRaw};
use prost::Message;

use super::{HistoryTransport, NodeTransport};
use crate::chain::error::TransportError;
use crate::chain::tx_builder::tx_hash;
use crate::chain::types::{
    AccountInfo, Balance, Block, BroadcastResponse, EventAttribute, GasEstimate, NodeInfo,
    Transaction, TxEvent,
};

#[derive(Debug, Clone, Copy)]
pub(crate) enum Failure {
    NotConnected,
    Timeout,
    /// The node answers, but not for this service.
    NotFound,
}

impl Failure {
    fn error(self) -> TransportError {
        match self {
            Failure::NotConnected => TransportError::NotConnected,
            Failure::Timeout => TransportError::Timeout,
            Failure::NotFound => TransportError::NotFound("unknown service".to_string()),
        }
    }
}

struct MockState {
    failure: Option<Failure>,
    height: u64,
    balances: Vec<Balance>,
    account: Option<AccountInfo>,
    gas_used: u64,
    check: (u32, String),
    deliver: (u32, String),
    blocks: HashMap<u64, Block>,
    txs: HashMap<String, Transaction>,
    calls: Vec<&'static str>,
    broadcasts: Vec<Vec<u8>>,
}

pub(crate) struct MockTransport {
    name: &'static str,
    state: Mutex<MockState>,
}

impl MockTransport {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(MockState {
                failure: None,
                height: 0,
                balances: Vec::new(),
                account: None,
                gas_used: 80_000,
                check: (0, String::new()),
                deliver: (0, String::new()),
                blocks: HashMap::new(),
                txs: HashMap::new(),
                calls: Vec::new(),
                broadcasts: Vec::new(),
            }),
        }
    }

    /// Every call fails with `failure`.
    pub(crate) fn failing(name: &'static str, failure: Failure) -> Self {
        let mock = Self::new(name);
        mock.state().failure = Some(failure);
        mock
    }

    pub(crate) fn with_height(self, height: u64) -> Self {
        self.state().height = height;
        self
    }

    pub(crate) fn with_balances(self, balances: &[(&str, &str)]) -> Self {
        self.state().balances = balances
            .iter()
            .map(|(denom, amount)| Balance {
                denom: denom.to_string(),
                amount: amount.to_string(),
            })
            .collect();
        self
    }

    pub(crate) fn with_account(self, account_number: u64, sequence: u64) -> Self {
        self.state().account = Some(AccountInfo {
            address: String::new(),
            account_number,
            sequence,
        });
        self
    }

    pub(crate) fn with_gas_used(self, gas_used: u64) -> Self {
        self.state().gas_used = gas_used;
        self
    }

    /// CheckTx answers `code` with `log`; nothing is included.
    pub(crate) fn rejecting_on_check(self, code: u32, log: &str) -> Self {
        self.state().check = (code, log.to_string());
        self
    }

    /// CheckTx passes, then the included transaction carries `code`.
    pub(crate) fn failing_on_delivery(self, code: u32, log: &str) -> Self {
        self.state().deliver = (code, log.to_string());
        self
    }

    pub(crate) fn with_block(self, block: Block) -> Self {
        self.state().blocks.insert(block.height, block);
        self
    }

    pub(crate) fn with_transaction(self, tx: Transaction) -> Self {
        self.state().txs.insert(tx.hash.clone(), tx);
        self
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    pub(crate) fn call_count(&self, call: &str) -> usize {
        self.state().calls.iter().filter(|c| **c == call).count()
    }

    pub(crate) fn broadcasts(&self) -> Vec<Vec<u8>> {
        self.state().broadcasts.clone()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    fn enter(&self, call: &'static str) -> Result<std::sync::MutexGuard<'_, MockState>, TransportError> {
        let mut state = self.state();
        state.calls.push(call);
        match state.failure {
            Some(failure) => Err(failure.error()),
            None => Ok(state),
        }
    }
}

fn gas_limit_of(tx_bytes: &[u8]) -> u64 {
    TxRaw::decode(tx_bytes)
        .ok()
        .and_then(|raw| AuthInfo::decode(&raw.auth_info_bytes[..]).ok())
        .and_then(|auth| auth.fee)
        .map(|fee| fee.gas_limit)
        .unwrap_or(0)
}

#[async_trait]
impl NodeTransport for MockTransport {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn latest_height(&self) -> Result<u64, TransportError> {
        Ok(self.enter("latest_height")?.height)
    }

    async fn all_balances(&self, _address: &str) -> Result<Vec<Balance>, TransportError> {
        Ok(self.enter("all_balances")?.balances.clone())
    }

    async fn account(&self, address: &str) -> Result<AccountInfo, TransportError> {
        let state = self.enter("account")?;
        match &state.account {
            Some(account) => Ok(AccountInfo {
                address: address.to_string(),
                ..account.clone()
            }),
            None => Err(TransportError::NotFound(format!("account {} not found", address))),
        }
    }

    async fn simulate(&self, _tx_bytes: &[u8]) -> Result<GasEstimate, TransportError> {
        let state = self.enter("simulate")?;
        Ok(GasEstimate {
            gas_wanted: 0,
            gas_used: state.gas_used,
        })
    }

    async fn broadcast(&self, tx_bytes: &[u8]) -> Result<BroadcastResponse, TransportError> {
        let mut state = self.enter("broadcast")?;
        state.broadcasts.push(tx_bytes.to_vec());

        let hash = tx_hash(tx_bytes);
        let gas_wanted = gas_limit_of(tx_bytes);
        // The node never burns more gas than the limit it was given
        let gas_used = state.gas_used.min(gas_wanted);

        let (check_code, check_log) = state.check.clone();
        if check_code != 0 {
            return Ok(BroadcastResponse {
                tx_hash: hash,
                code: check_code,
                raw_log: check_log,
                gas_wanted,
                gas_used,
            });
        }

        state.height += 1;
        let (deliver_code, deliver_log) = state.deliver.clone();
        let included = Transaction {
            hash: hash.clone(),
            height: state.height,
            result_code: deliver_code,
            raw_log: deliver_log,
            gas_wanted,
            gas_used,
            timestamp: None,
            events: vec![TxEvent {
                kind: "tx".to_string(),
                attributes: vec![EventAttribute {
                    key: "fee".to_string(),
                    value: String::new(),
                }],
            }],
            messages: Vec::new(),
        };
        state.txs.insert(hash.clone(), included);
        if let Some(account) = state.account.as_mut() {
            account.sequence += 1;
        }

        Ok(BroadcastResponse {
            tx_hash: hash,
            code: 0,
            raw_log: String::new(),
            gas_wanted: 0,
            gas_used: 0,
        })
    }
}

#[async_trait]
impl HistoryTransport for MockTransport {
    async fn block_at(&self, height: u64) -> Result<Block, TransportError> {
        let state = self.enter("block_at")?;
        state
            .blocks
            .get(&height)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("block {}", height)))
    }

    async fn transaction_by_hash(&self, hash: &str) -> Result<Transaction, TransportError> {
        let state = self.enter("transaction_by_hash")?;
        state
            .txs
            .get(hash)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("tx not found: {}", hash)))
    }

    async fn node_info(&self) -> Result<NodeInfo, TransportError> {
        let _state = self.enter("node_info")?;
        Ok(NodeInfo {
            network: "aaa".to_string(),
            moniker: "mock".to_string(),
            version: "0.38.0".to_string(),
            app_version: "v0.50.0".to_string(),
        })
    }
}
