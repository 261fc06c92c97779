use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::messages::DecodedMessage;

/// Amount of a single denom held by an address, in minimal units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub denom: String,
    pub amount: String,
}

/// Balances of one address keyed by denom. Denoms are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSet(BTreeMap<String, String>);

impl BalanceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a balance, replacing any earlier entry for the same denom.
    pub fn insert(&mut self, balance: Balance) {
        self.0.insert(balance.denom, balance.amount);
    }

    /// Amount held in `denom`, if any.
    pub fn get(&self, denom: &str) -> Option<&str> {
        self.0.get(denom).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Balances in denom order.
    pub fn iter(&self) -> impl Iterator<Item = Balance> + '_ {
        self.0.iter().map(|(denom, amount)| Balance {
            denom: denom.clone(),
            amount: amount.clone(),
        })
    }
}

impl FromIterator<Balance> for BalanceSet {
    fn from_iter<I: IntoIterator<Item = Balance>>(iter: I) -> Self {
        let mut set = BalanceSet::new();
        for balance in iter {
            set.insert(balance);
        }
        set
    }
}

/// Block header summary. Hashes are upper-case hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub proposer_address: String,
    pub tx_count: usize,
    pub data_hash: String,
    pub validators_hash: String,
    pub consensus_hash: String,
    pub app_hash: String,
    pub last_results_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
}

/// ABCI event emitted while executing a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: Vec<EventAttribute>,
}

/// A transaction included in a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub height: u64,
    /// 0 means success
    pub result_code: u32,
    pub raw_log: String,
    pub gas_wanted: u64,
    pub gas_used: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub events: Vec<TxEvent>,
    pub messages: Vec<DecodedMessage>,
}

impl Transaction {
    pub fn succeeded(&self) -> bool {
        self.result_code == 0
    }
}

/// Signing state of an account as tracked by the node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountInfo {
    pub address: String,
    pub account_number: u64,
    pub sequence: u64,
}

/// Node information for health checks and chain verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub network: String,
    pub moniker: String,
    pub version: String,
    pub app_version: String,
}

/// Gas figures returned by a simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasEstimate {
    pub gas_wanted: u64,
    pub gas_used: u64,
}

/// Immediate answer to a SYNC broadcast (CheckTx result).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastResponse {
    pub tx_hash: String,
    pub code: u32,
    pub raw_log: String,
    pub gas_wanted: u64,
    pub gas_used: u64,
}

/// Fee for one transaction attempt. Recomputed every attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fee {
    pub gas_limit: u64,
    pub gas_price: f64,
    pub amount: String,
    pub denom: String,
}

/// Outcome of a confirmed transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxResult {
    pub hash: String,
    pub height: u64,
    pub code: u32,
    pub gas_wanted: u64,
    pub gas_used: u64,
    pub events: Vec<TxEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coin(denom: &str, amount: &str) -> Balance {
        Balance {
            denom: denom.to_string(),
            amount: amount.to_string(),
        }
    }

    #[test]
    fn test_balance_set_dedupes_by_denom() {
        let set: BalanceSet = vec![coin("ustake", "1"), coin("atom", "5"), coin("ustake", "7")]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("ustake"), Some("7"));
        assert_eq!(set.get("missing"), None);

        let denoms: Vec<String> = set.iter().map(|b| b.denom).collect();
        assert_eq!(denoms, vec!["atom", "ustake"]);
    }

    #[test]
    fn test_empty_balance_set() {
        let set = BalanceSet::new();
        assert!(set.is_empty());
        assert_eq!(set.iter().count(), 0);
    }
}
