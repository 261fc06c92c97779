use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::chain::address::validate_address;
use crate::chain::amount::ensure_positive_minimal;
use crate::chain::client::ChainQueryClient;
use crate::chain::error::{ClientError, ClientResult};
use crate::chain::fee::FeeEstimator;
use crate::chain::messages::TxMessage;
use crate::chain::tx_builder::{tx_hash, TxBuilder};
use crate::chain::types::{Fee, TxResult};
use crate::chain::wallet::Wallet;
use crate::config::Config;

/// Lifecycle of one transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Built,
    Simulated,
    Signed,
    Broadcast,
    Confirmed,
    Rejected,
    TransportFailed,
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransferStage::Built => "built",
            TransferStage::Simulated => "simulated",
            TransferStage::Signed => "signed",
            TransferStage::Broadcast => "broadcast",
            TransferStage::Confirmed => "confirmed",
            TransferStage::Rejected => "rejected",
            TransferStage::TransportFailed => "transport failed",
        };
        f.write_str(name)
    }
}

fn log_stage(stage: TransferStage, hash: &str) {
    log::debug!("Transfer {}: {}", if hash.is_empty() { "<unsigned>" } else { hash }, stage);
}

/// Signs and submits transfers for the wallet it holds.
///
/// Transfers take `&mut self`, so one client can only have one transfer in
/// flight; the node's sequence number for the account stays in step.
pub struct TxClient {
    query: Arc<ChainQueryClient>,
    chain_id: String,
    address_prefix: String,
    estimator: FeeEstimator,
    confirm_timeout: Duration,
    confirm_poll_interval: Duration,
    wallet: Option<Wallet>,
}

impl TxClient {
    pub fn new(query: Arc<ChainQueryClient>, config: &Config) -> Self {
        Self {
            query,
            chain_id: config.chain.chain_id.clone(),
            address_prefix: config.chain.address_prefix.clone(),
            estimator: FeeEstimator::from_config(&config.chain),
            confirm_timeout: config.network.confirm_timeout(),
            confirm_poll_interval: config.network.confirm_poll_interval(),
            wallet: None,
        }
    }

    /// Start a signing session, dropping any previous wallet first.
    pub fn set_wallet(&mut self, wallet: Wallet) {
        self.wallet = None;
        log::info!("Signing session opened for {}", wallet.address());
        self.wallet = Some(wallet);
    }

    /// End the signing session; the key is zeroized on drop.
    pub fn clear_wallet(&mut self) {
        if let Some(wallet) = self.wallet.take() {
            log::info!("Signing session closed for {}", wallet.address());
        }
    }

    pub fn wallet(&self) -> Option<&Wallet> {
        self.wallet.as_ref()
    }

    fn session(&self, from: &str) -> ClientResult<&Wallet> {
        let wallet = self.wallet.as_ref().ok_or(ClientError::NoSigningSession)?;
        if wallet.address() != from {
            return Err(ClientError::InvalidAddress(format!(
                "sender {} is not the session address {}",
                from,
                wallet.address()
            )));
        }
        Ok(wallet)
    }

    /// Simulate `messages` from `from` and price the result at the average
    /// gas price.
    pub async fn estimate_fee(&self, from: &str, messages: &[TxMessage], memo: &str) -> ClientResult<Fee> {
        let wallet = self.session(from)?;
        let account = self.query.account(from).await?;
        let builder = TxBuilder::new(&self.chain_id, account, wallet).with_memo(memo);
        self.estimator.estimate(&self.query, &builder, messages).await
    }

    /// Build, simulate, sign, broadcast and confirm a single-coin transfer.
    ///
    /// A nonzero result code, whether from CheckTx or from the included
    /// transaction, is `TransactionRejected` with the node's log untouched.
    pub async fn send_transfer(
        &mut self,
        from: &str,
        to: &str,
        minimal_amount: &str,
        denom: &str,
        memo: &str,
    ) -> ClientResult<TxResult> {
        let wallet = self.session(from)?;
        validate_address(to, &self.address_prefix)?;
        let amount = ensure_positive_minimal(minimal_amount)?;
        if denom.is_empty() {
            return Err(ClientError::InvalidAmount("denom is empty".to_string()));
        }

        let account = self.query.account(from).await?;
        let messages = vec![TxMessage::transfer(from, to, &amount, denom)];
        let builder = TxBuilder::new(&self.chain_id, account, wallet).with_memo(memo);
        log_stage(TransferStage::Built, "");

        let fee = self.estimator.estimate(&self.query, &builder, &messages).await?;
        log_stage(TransferStage::Simulated, "");

        let tx_bytes = builder.build_signed(&messages, &fee)?;
        let local_hash = tx_hash(&tx_bytes);
        log_stage(TransferStage::Signed, &local_hash);

        let response = match self.query.broadcast(&tx_bytes).await {
            Ok(response) => response,
            Err(e) => {
                log_stage(TransferStage::TransportFailed, &local_hash);
                return Err(e);
            }
        };
        let hash = if response.tx_hash.is_empty() {
            local_hash
        } else {
            response.tx_hash.clone()
        };
        log_stage(TransferStage::Broadcast, &hash);

        if response.code != 0 {
            log_stage(TransferStage::Rejected, &hash);
            let gas_wanted = if response.gas_wanted == 0 { fee.gas_limit } else { response.gas_wanted };
            return Err(ClientError::TransactionRejected {
                code: response.code,
                raw_log: response.raw_log,
                hash,
                gas_wanted,
                gas_used: response.gas_used,
            });
        }

        let tx = match self
            .query
            .wait_for_transaction(&hash, self.confirm_timeout, self.confirm_poll_interval)
            .await
        {
            Ok(tx) => tx,
            Err(e) => {
                log_stage(TransferStage::TransportFailed, &hash);
                return Err(e);
            }
        };

        if !tx.succeeded() {
            log_stage(TransferStage::Rejected, &hash);
            return Err(ClientError::TransactionRejected {
                code: tx.result_code,
                raw_log: tx.raw_log,
                hash,
                gas_wanted: tx.gas_wanted,
                gas_used: tx.gas_used,
            });
        }

        log_stage(TransferStage::Confirmed, &hash);
        log::info!("Transfer {} confirmed at height {}", hash, tx.height);
        Ok(TxResult {
            hash,
            height: tx.height,
            code: tx.result_code,
            gas_wanted: tx.gas_wanted,
            gas_used: tx.gas_used,
            events: tx.events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::transport::mock::{Failure, MockTransport};
    use crate::chain::transport::NodeTransport;
    use crate::chain::wallet::WalletKeyManager;
    use cosmos_sdk_proto::cosmos::bank::v1beta1::MsgSend;
    use cosmos_sdk_proto::cosmos::tx::v1beta1::{AuthInfo, TxBody, TxRaw};
    use prost::Message;

    const TEST_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    const SENDER: &str = "cosmos19rl4cm2hmr8afy4kldpxz3fka4jguq0auqdal4";
    const RECIPIENT: &str = "cosmos1abcdefghijklmnopqrstuvwxyz0123456789ab";
    const INSUFFICIENT: &str =
        "spendable balance 10ustake is smaller than 1500000ustake: insufficient funds";

    fn tx_client(node: &Arc<MockTransport>) -> TxClient {
        let transports: Vec<Arc<dyn NodeTransport>> = vec![node.clone()];
        let query = ChainQueryClient::with_transports(transports, node.clone(), "cosmos");
        TxClient::new(Arc::new(query), &Config::default())
    }

    fn signed_in(node: &Arc<MockTransport>) -> TxClient {
        let mut client = tx_client(node);
        client.set_wallet(Wallet::from_mnemonic(TEST_MNEMONIC, "cosmos").unwrap());
        client
    }

    #[tokio::test]
    async fn test_transfer_confirmed() {
        let node = Arc::new(MockTransport::new("node").with_account(12, 4).with_gas_used(90_000));
        let mut client = signed_in(&node);

        let result = client
            .send_transfer(SENDER, RECIPIENT, "1500000", "ustake", "rent")
            .await
            .unwrap();

        assert_eq!(result.code, 0);
        assert_eq!(result.gas_wanted, 117_000);
        assert!(result.gas_used <= result.gas_wanted);
        assert!(!result.events.is_empty());

        let broadcasts = node.broadcasts();
        assert_eq!(broadcasts.len(), 1);
        assert_eq!(result.hash, tx_hash(&broadcasts[0]));

        let raw = TxRaw::decode(&broadcasts[0][..]).unwrap();
        let auth = AuthInfo::decode(&raw.auth_info_bytes[..]).unwrap();
        assert_eq!(auth.signer_infos[0].sequence, 4);
        assert_eq!(auth.fee.unwrap().amount[0].amount, "2925");
    }

    #[tokio::test]
    async fn test_transfer_amount_sent_without_leading_zeros() {
        let node = Arc::new(MockTransport::new("node").with_account(12, 0).with_gas_used(80_000));
        let mut client = signed_in(&node);

        client
            .send_transfer(SENDER, RECIPIENT, "0100", "ustake", "")
            .await
            .unwrap();

        let raw = TxRaw::decode(&node.broadcasts()[0][..]).unwrap();
        let body = TxBody::decode(&raw.body_bytes[..]).unwrap();
        let send = MsgSend::decode(&body.messages[0].value[..]).unwrap();
        assert_eq!(send.amount[0].amount, "100");
        assert_eq!(send.amount[0].denom, "ustake");
    }

    #[tokio::test]
    async fn test_insufficient_funds_on_delivery() {
        let node = Arc::new(
            MockTransport::new("node")
                .with_account(12, 0)
                .failing_on_delivery(5, INSUFFICIENT),
        );
        let mut client = signed_in(&node);

        let err = client
            .send_transfer(SENDER, RECIPIENT, "1500000", "ustake", "")
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
        match err {
            ClientError::TransactionRejected { code, raw_log, gas_wanted, gas_used, .. } => {
                assert_eq!(code, 5);
                assert_eq!(raw_log, INSUFFICIENT);
                assert!(gas_used <= gas_wanted);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_insufficient_funds_on_check() {
        let node = Arc::new(
            MockTransport::new("node")
                .with_account(12, 0)
                .rejecting_on_check(5, INSUFFICIENT),
        );
        let mut client = signed_in(&node);

        match client.send_transfer(SENDER, RECIPIENT, "1500000", "ustake", "").await {
            Err(ClientError::TransactionRejected { code, raw_log, gas_wanted, gas_used, .. }) => {
                assert_eq!(code, 5);
                assert_eq!(raw_log, INSUFFICIENT);
                assert!(gas_used <= gas_wanted);
            }
            other => panic!("unexpected {:?}", other),
        }
        // Rejected at CheckTx: nothing to wait for
        assert_eq!(node.call_count("transaction_by_hash"), 0);
    }

    #[tokio::test]
    async fn test_failed_import_leaves_no_session() {
        let mut keys = WalletKeyManager::new("cosmos");
        keys.import_from_phrase(TEST_MNEMONIC).unwrap();

        let bad = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon";
        assert!(matches!(keys.import_from_phrase(bad), Err(ClientError::InvalidMnemonic(_))));
        assert!(keys.active().is_none());

        let node = Arc::new(MockTransport::new("node"));
        let mut client = tx_client(&node);
        if let Some(wallet) = keys.take() {
            client.set_wallet(wallet);
        }

        let err = client
            .send_transfer(SENDER, RECIPIENT, "1", "ustake", "")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::NoSigningSession));
        assert!(matches!(
            client.estimate_fee(SENDER, &[], "").await,
            Err(ClientError::NoSigningSession)
        ));
        assert!(node.calls().is_empty());
    }

    #[tokio::test]
    async fn test_validation_happens_before_io() {
        let node = Arc::new(MockTransport::new("node"));
        let mut client = signed_in(&node);

        let bad_recipient = client.send_transfer(SENDER, "osmo1xyz", "1", "ustake", "").await;
        assert!(matches!(bad_recipient, Err(ClientError::InvalidAddress(_))));

        let zero = client.send_transfer(SENDER, RECIPIENT, "0", "ustake", "").await;
        assert!(matches!(zero, Err(ClientError::InvalidAmount(_))));

        let no_denom = client.send_transfer(SENDER, RECIPIENT, "5", "", "").await;
        assert!(matches!(no_denom, Err(ClientError::InvalidAmount(_))));

        let other_sender = client.send_transfer(RECIPIENT, SENDER, "5", "ustake", "").await;
        assert!(matches!(other_sender, Err(ClientError::InvalidAddress(_))));

        assert!(node.calls().is_empty());
    }

    #[tokio::test]
    async fn test_node_unreachable_is_retryable() {
        let node = Arc::new(MockTransport::failing("node", Failure::NotConnected));
        let mut client = signed_in(&node);

        let err = client
            .send_transfer(SENDER, RECIPIENT, "1", "ustake", "")
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(node.broadcasts().is_empty());
    }

    #[tokio::test]
    async fn test_estimate_fee_with_session() {
        let node = Arc::new(MockTransport::new("node").with_gas_used(100_000));
        let client = signed_in(&node);

        let messages = vec![TxMessage::transfer(SENDER, RECIPIENT, "1", "ustake")];
        let fee = client.estimate_fee(SENDER, &messages, "").await.unwrap();
        assert_eq!(fee.gas_limit, 130_000);
        assert_eq!(fee.amount, "3250");
    }

    #[test]
    fn test_clear_wallet_ends_session() {
        let node = Arc::new(MockTransport::new("node"));
        let mut client = signed_in(&node);
        assert_eq!(client.wallet().map(Wallet::address), Some(SENDER));

        client.clear_wallet();
        assert!(client.wallet().is_none());
    }
}
