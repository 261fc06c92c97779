pub mod address;
pub mod amount;
pub mod broadcaster;
pub mod client;
pub mod error;
pub mod faucet;
pub mod fee;
pub mod messages;
pub mod transport;
pub mod tx_builder;
pub mod types;
pub mod wallet;

pub use address::{is_valid_address, validate_address};
pub use amount::{parse_transfer_amount, to_display_units, to_minimal_units};
pub use broadcaster::{TransferStage, TxClient};
pub use client::ChainQueryClient;
pub use error::{ClientError, ClientResult, TransportError};
pub use faucet::FaucetClient;
pub use fee::FeeEstimator;
pub use messages::{DecodedMessage, TxMessage};
pub use tx_builder::{tx_hash, TxBuilder};
pub use types::{AccountInfo, Balance, BalanceSet, Block, Fee, NodeInfo, Transaction, TxResult};
pub use wallet::{Wallet, WalletKeyManager};
