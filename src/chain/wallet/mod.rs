mod keys;
mod signer;

pub use keys::{account_address, Wallet, WalletKeyManager};
pub use signer::TransactionSigner;
