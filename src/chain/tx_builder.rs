use cosmos_sdk_proto::cosmos::base::v1beta1::Coin;
use cosmos_sdk_proto::cosmos::crypto::secp256k1::PubKey;
use cosmos_sdk_proto::cosmos::tx::signing::v1beta1::SignMode;
use cosmos_sdk_proto::cosmos::tx::v1beta1::{
    mode_info, AuthInfo, Fee as ProtoFee, ModeInfo, SignDoc, SignerInfo, TxBody, TxRaw,
};
use cosmos_sdk_proto::Any;
use prost::Message;
use sha2::{Digest, Sha256};

use crate::chain::error::ClientResult;
use crate::chain::messages::TxMessage;
use crate::chain::types::{AccountInfo, Fee};
use crate::chain::wallet::{TransactionSigner, Wallet};

const SECP256K1_PUBKEY_TYPE_URL: &str = "/cosmos.crypto.secp256k1.PubKey";

/// Builds `TxRaw` bytes for one account at one sequence number.
///
/// The builder borrows the wallet; it never copies key material.
pub struct TxBuilder<'a> {
    chain_id: String,
    account: AccountInfo,
    wallet: &'a Wallet,
    memo: String,
    signer: TransactionSigner,
}

impl<'a> TxBuilder<'a> {
    pub fn new(chain_id: &str, account: AccountInfo, wallet: &'a Wallet) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            account,
            wallet,
            memo: String::new(),
            signer: TransactionSigner::new(),
        }
    }

    pub fn with_memo(mut self, memo: &str) -> Self {
        self.memo = memo.to_string();
        self
    }

    pub fn sequence(&self) -> u64 {
        self.account.sequence
    }

    /// Transaction for simulation: real body and signer info, no fee and an
    /// empty signature. The node skips signature checks when simulating.
    pub fn build_unsigned(&self, messages: &[TxMessage]) -> Vec<u8> {
        let tx_raw = TxRaw {
            body_bytes: self.body_bytes(messages),
            auth_info_bytes: self.auth_info_bytes(None),
            signatures: vec![Vec::new()],
        };
        tx_raw.encode_to_vec()
    }

    /// Fully signed transaction ready for broadcast (SIGN_MODE_DIRECT).
    pub fn build_signed(&self, messages: &[TxMessage], fee: &Fee) -> ClientResult<Vec<u8>> {
        let body_bytes = self.body_bytes(messages);
        let auth_info_bytes = self.auth_info_bytes(Some(fee));

        let sign_doc = SignDoc {
            body_bytes: body_bytes.clone(),
            auth_info_bytes: auth_info_bytes.clone(),
            chain_id: self.chain_id.clone(),
            account_number: self.account.account_number,
        };

        let private_key = self.wallet.private_key()?;
        let signature = self.signer.sign_doc(&sign_doc.encode_to_vec(), &private_key)?;

        let tx_raw = TxRaw {
            body_bytes,
            auth_info_bytes,
            signatures: vec![signature],
        };
        Ok(tx_raw.encode_to_vec())
    }

    fn body_bytes(&self, messages: &[TxMessage]) -> Vec<u8> {
        let body = TxBody {
            messages: messages.iter().map(TxMessage::to_any).collect(),
            memo: self.memo.clone(),
            ..Default::default()
        };
        body.encode_to_vec()
    }

    fn auth_info_bytes(&self, fee: Option<&Fee>) -> Vec<u8> {
        let public_key = Any {
            type_url: SECP256K1_PUBKEY_TYPE_URL.to_string(),
            value: PubKey {
                key: self.wallet.public_key_compressed().to_vec(),
            }
            .encode_to_vec(),
        };

        let signer_info = SignerInfo {
            public_key: Some(public_key),
            mode_info: Some(ModeInfo {
                sum: Some(mode_info::Sum::Single(mode_info::Single {
                    mode: SignMode::Direct as i32,
                })),
            }),
            sequence: self.account.sequence,
        };

        let fee = match fee {
            Some(fee) => ProtoFee {
                amount: vec![Coin {
                    denom: fee.denom.clone(),
                    amount: fee.amount.clone(),
                }],
                gas_limit: fee.gas_limit,
                ..Default::default()
            },
            None => ProtoFee::default(),
        };

        AuthInfo {
            signer_infos: vec![signer_info],
            fee: Some(fee),
            ..Default::default()
        }
        .encode_to_vec()
    }
}

/// Hash the node will index the transaction under: upper-case hex SHA-256
/// of the raw bytes.
pub fn tx_hash(tx_bytes: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(tx_bytes))
}
