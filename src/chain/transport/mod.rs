//! Node transports. The query client holds an ordered list of
//! `NodeTransport`s (binary gRPC first, REST second) and one
//! `HistoryTransport` for the lookups only the REST gateway serves.

use std::future::Future;

use async_trait::async_trait;
use cosmos_sdk_proto::cosmos::auth::v1beta1::BaseAccount;
use cosmos_sdk_proto::cosmos::vesting::v1beta1::{
    ContinuousVestingAccount, DelayedVestingAccount, PeriodicVestingAccount,
    PermanentLockedAccount,
};
use cosmos_sdk_proto::Any;
use prost::Message;

use super::error::TransportError;
use super::types::{AccountInfo, Balance, Block, BroadcastResponse, GasEstimate, NodeInfo, Transaction};

mod grpc;
mod rest;

#[cfg(test)]
pub(crate) mod mock;

pub use grpc::GrpcTransport;
pub use rest::RestTransport;

/// Queries and submissions available on every transport.
#[async_trait]
pub trait NodeTransport: Send + Sync {
    /// Short label used in logs and error context.
    fn name(&self) -> &'static str;

    async fn latest_height(&self) -> Result<u64, TransportError>;

    /// Every denom held by `address`, all pages.
    async fn all_balances(&self, address: &str) -> Result<Vec<Balance>, TransportError>;

    /// `NotFound` when the node has never seen the address.
    async fn account(&self, address: &str) -> Result<AccountInfo, TransportError>;

    async fn simulate(&self, tx_bytes: &[u8]) -> Result<GasEstimate, TransportError>;

    /// SYNC broadcast: returns once CheckTx has run.
    async fn broadcast(&self, tx_bytes: &[u8]) -> Result<BroadcastResponse, TransportError>;
}

/// Historical lookups (REST only).
#[async_trait]
pub trait HistoryTransport: Send + Sync {
    async fn block_at(&self, height: u64) -> Result<Block, TransportError>;

    async fn transaction_by_hash(&self, hash: &str) -> Result<Transaction, TransportError>;

    async fn node_info(&self) -> Result<NodeInfo, TransportError>;
}

/// Fetch pages until one comes back with a missing or empty next key.
///
/// `fetch_page` receives the key to resume from (`None` for the first page)
/// and returns the page items together with the node's next key.
pub(crate) async fn collect_pages<T, K, F, Fut>(mut fetch_page: F) -> Result<Vec<T>, TransportError>
where
    K: AsRef<[u8]>,
    F: FnMut(Option<K>) -> Fut,
    Fut: Future<Output = Result<(Vec<T>, Option<K>), TransportError>>,
{
    let mut items = Vec::new();
    let mut next_key = None;

    loop {
        let (page, key) = fetch_page(next_key.take()).await?;
        items.extend(page);

        match key {
            Some(key) if !key.as_ref().is_empty() => next_key = Some(key),
            _ => return Ok(items),
        }
    }
}

const BASE_ACCOUNT: &str = "/cosmos.auth.v1beta1.BaseAccount";
const CONTINUOUS_VESTING_ACCOUNT: &str = "/cosmos.vesting.v1beta1.ContinuousVestingAccount";
const DELAYED_VESTING_ACCOUNT: &str = "/cosmos.vesting.v1beta1.DelayedVestingAccount";
const PERIODIC_VESTING_ACCOUNT: &str = "/cosmos.vesting.v1beta1.PeriodicVestingAccount";
const PERMANENT_LOCKED_ACCOUNT: &str = "/cosmos.vesting.v1beta1.PermanentLockedAccount";

/// Pull number and sequence out of the `Any` an auth query returns.
pub(crate) fn decode_account(any: &Any) -> Result<AccountInfo, TransportError> {
    let base = match any.type_url.as_str() {
        BASE_ACCOUNT => Some(BaseAccount::decode(&any.value[..])?),
        CONTINUOUS_VESTING_ACCOUNT => ContinuousVestingAccount::decode(&any.value[..])?
            .base_vesting_account
            .and_then(|v| v.base_account),
        DELAYED_VESTING_ACCOUNT => DelayedVestingAccount::decode(&any.value[..])?
            .base_vesting_account
            .and_then(|v| v.base_account),
        PERIODIC_VESTING_ACCOUNT => PeriodicVestingAccount::decode(&any.value[..])?
            .base_vesting_account
            .and_then(|v| v.base_account),
        PERMANENT_LOCKED_ACCOUNT => PermanentLockedAccount::decode(&any.value[..])?
            .base_vesting_account
            .and_then(|v| v.base_account),
        other => {
            return Err(TransportError::Decode(format!("unsupported account type {}", other)));
        }
    };

    let base = base.ok_or_else(|| {
        TransportError::Decode(format!("{} without a base account", any.type_url))
    })?;

    Ok(AccountInfo {
        address: base.address,
        account_number: base.account_number,
        sequence: base.sequence,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cosmos_sdk_proto::cosmos::vesting::v1beta1::BaseVestingAccount;

    fn base(sequence: u64) -> BaseAccount {
        BaseAccount {
            address: "cosmos1abc".to_string(),
            pub_key: None,
            account_number: 42,
            sequence,
        }
    }

    #[tokio::test]
    async fn test_collect_pages_follows_next_key() {
        let mut pages = vec![
            (vec![1, 2], Some("b".to_string())),
            (vec![3], Some("c".to_string())),
            (vec![4], Some(String::new())),
        ]
        .into_iter();
        let mut requested = Vec::new();

        let items = collect_pages(|key: Option<String>| {
            requested.push(key);
            std::future::ready(pages.next().ok_or_else(|| TransportError::Decode("no more pages".into())))
        })
        .await
        .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4]);
        assert_eq!(requested, vec![None, Some("b".to_string()), Some("c".to_string())]);
    }

    #[tokio::test]
    async fn test_collect_pages_stops_without_key() {
        let mut calls = 0;
        let items = collect_pages(|_key: Option<Vec<u8>>| {
            calls += 1;
            std::future::ready(Ok((vec!["uatom"], None)))
        })
        .await
        .unwrap();

        assert_eq!(items, vec!["uatom"]);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_collect_pages_stops_on_error() {
        let mut calls = 0;
        let result = collect_pages(|key: Option<Vec<u8>>| {
            calls += 1;
            std::future::ready(match key {
                None => Ok((vec![1], Some(vec![0xAB]))),
                Some(_) => Err(TransportError::Timeout),
            })
        })
        .await;

        assert!(matches!(result, Err(TransportError::Timeout)));
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_decode_base_account() {
        let any = Any {
            type_url: BASE_ACCOUNT.to_string(),
            value: base(7).encode_to_vec(),
        };
        let info = decode_account(&any).unwrap();
        assert_eq!(info.account_number, 42);
        assert_eq!(info.sequence, 7);
        assert_eq!(info.address, "cosmos1abc");
    }

    #[test]
    fn test_decode_vesting_account() {
        let vesting = ContinuousVestingAccount {
            base_vesting_account: Some(BaseVestingAccount {
                base_account: Some(base(3)),
                ..Default::default()
            }),
            ..Default::default()
        };
        let any = Any {
            type_url: CONTINUOUS_VESTING_ACCOUNT.to_string(),
            value: vesting.encode_to_vec(),
        };
        assert_eq!(decode_account(&any).unwrap().sequence, 3);
    }

    #[test]
    fn test_decode_unknown_account_type() {
        let any = Any {
            type_url: "/ethermint.types.v1.EthAccount".to_string(),
            value: vec![],
        };
        assert!(matches!(decode_account(&any), Err(TransportError::Decode(_))));
    }
}
