//! Transaction messages: the outgoing kinds we build and the decoded
//! summaries we hand back when reading transactions from the node.

use cosmos_sdk_proto::cosmos::bank::v1beta1::MsgSend;
use cosmos_sdk_proto::cosmos::base::v1beta1::Coin;
use cosmos_sdk_proto::cosmos::staking::v1beta1::MsgDelegate;
use cosmos_sdk_proto::Any;
use prost::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::Balance;

pub const MSG_SEND_TYPE_URL: &str = "/cosmos.bank.v1beta1.MsgSend";
pub const MSG_DELEGATE_TYPE_URL: &str = "/cosmos.staking.v1beta1.MsgDelegate";

/// A message to include in an outgoing transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum TxMessage {
    Transfer(MsgSend),
    Delegate(MsgDelegate),
    /// Any other message, passed through untouched.
    Raw(Any),
}

impl TxMessage {
    /// Single-coin bank transfer.
    pub fn transfer(from: &str, to: &str, amount: &str, denom: &str) -> Self {
        TxMessage::Transfer(MsgSend {
            from_address: from.to_string(),
            to_address: to.to_string(),
            amount: vec![Coin {
                denom: denom.to_string(),
                amount: amount.to_string(),
            }],
        })
    }

    pub fn type_url(&self) -> &str {
        match self {
            TxMessage::Transfer(_) => MSG_SEND_TYPE_URL,
            TxMessage::Delegate(_) => MSG_DELEGATE_TYPE_URL,
            TxMessage::Raw(any) => &any.type_url,
        }
    }

    pub fn to_any(&self) -> Any {
        match self {
            TxMessage::Transfer(msg) => Any {
                type_url: MSG_SEND_TYPE_URL.to_string(),
                value: msg.encode_to_vec(),
            },
            TxMessage::Delegate(msg) => Any {
                type_url: MSG_DELEGATE_TYPE_URL.to_string(),
                value: msg.encode_to_vec(),
            },
            TxMessage::Raw(any) => any.clone(),
        }
    }
}

/// Typed summary of a message found in a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodedMessage {
    Transfer {
        from: String,
        to: String,
        amount: Vec<Balance>,
    },
    Delegate {
        delegator: String,
        validator: String,
        amount: Option<Balance>,
    },
    /// Unrecognized (or unparsable) message, kept verbatim.
    Unknown { type_url: String, payload: Value },
}

enum MessageKind {
    Send,
    Delegate,
    Other,
}

impl MessageKind {
    fn of(type_url: &str) -> Self {
        match type_url {
            MSG_SEND_TYPE_URL => MessageKind::Send,
            MSG_DELEGATE_TYPE_URL => MessageKind::Delegate,
            _ => MessageKind::Other,
        }
    }
}

#[derive(Deserialize)]
struct SendJson {
    #[serde(alias = "fromAddress")]
    from_address: String,
    #[serde(alias = "toAddress")]
    to_address: String,
    #[serde(default)]
    amount: Vec<Balance>,
}

#[derive(Deserialize)]
struct DelegateJson {
    #[serde(alias = "delegatorAddress")]
    delegator_address: String,
    #[serde(alias = "validatorAddress")]
    validator_address: String,
    #[serde(default)]
    amount: Option<Balance>,
}

impl DecodedMessage {
    /// Decode one entry of `tx.body.messages` from the REST gateway.
    /// Never fails: anything not understood comes back as `Unknown`.
    pub fn from_json(value: &Value) -> Self {
        let type_url = value
            .get("@type")
            .or_else(|| value.get("typeUrl"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let decoded = match MessageKind::of(&type_url) {
            MessageKind::Send => serde_json::from_value::<SendJson>(value.clone())
                .ok()
                .map(|msg| DecodedMessage::Transfer {
                    from: msg.from_address,
                    to: msg.to_address,
                    amount: msg.amount,
                }),
            MessageKind::Delegate => serde_json::from_value::<DelegateJson>(value.clone())
                .ok()
                .map(|msg| DecodedMessage::Delegate {
                    delegator: msg.delegator_address,
                    validator: msg.validator_address,
                    amount: msg.amount,
                }),
            MessageKind::Other => None,
        };

        decoded.unwrap_or_else(|| {
            log::debug!("Passing through message of type {:?}", type_url);
            DecodedMessage::Unknown {
                type_url,
                payload: value.clone(),
            }
        })
    }
}
