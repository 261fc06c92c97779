// Library exports for stakewallet

pub mod chain;
pub mod config;
pub mod monitor;

// Re-export main types for convenience
pub use chain::{ChainQueryClient, ClientError, ClientResult, TxClient, Wallet, WalletKeyManager};
pub use config::Config;
pub use monitor::{ConnectionMonitor, ConnectionState, MonitorSnapshot};
