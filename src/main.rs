use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

use stakewallet::chain::{
    parse_transfer_amount, to_display_units, BalanceSet, ChainQueryClient, FaucetClient, TxClient,
    Wallet, WalletKeyManager,
};
use stakewallet::{Config, ConnectionMonitor};

const MNEMONIC_ENV: &str = "STAKEWALLET_MNEMONIC";
const DISPLAY_PRECISION: u32 = 6;

#[derive(Parser)]
#[command(name = "stakewallet")]
#[command(about = "Wallet and query client for Cosmos SDK nodes", version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a default configuration file
    Init {
        /// Output path for config file
        #[arg(short, long, default_value = "config.toml")]
        output: String,
    },

    /// Print the latest block height
    Height,

    /// Show a block header (latest if no height is given)
    Block { height: Option<u64> },

    /// Show node identity and versions
    Info,

    /// List balances of an address
    Balance { address: String },

    /// Look up a transaction by hash
    Tx { hash: String },

    /// Generate a new 24-word wallet
    Generate,

    /// Send tokens from the wallet in STAKEWALLET_MNEMONIC
    Send {
        /// Recipient address
        to: String,
        /// Amount in display units, e.g. 1.5
        amount: String,
        #[arg(long, default_value = "")]
        memo: String,
    },

    /// Ask the faucet to fund an address
    Faucet { address: String },

    /// Poll the node until interrupted
    Monitor {
        /// Also track balances of this address
        #[arg(long)]
        address: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stakewallet=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Commands::Init { output } = &cli.command {
        Config::default().save(output)?;
        info!("Configuration file created at: {}", output);
        return Ok(());
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init { .. } => {}
        Commands::Generate => generate(&config)?,
        Commands::Faucet { address } => faucet(&config, &address).await?,
        command => {
            let client = Arc::new(ChainQueryClient::connect(&config).await?);
            run_query(command, &config, client).await?;
        }
    }

    Ok(())
}

fn load_config(path: &str) -> Result<Config> {
    if Path::new(path).exists() {
        Config::load(path)
    } else {
        warn!("{} not found, using local test chain defaults", path);
        Ok(Config::default())
    }
}

async fn run_query(command: Commands, config: &Config, client: Arc<ChainQueryClient>) -> Result<()> {
    match command {
        Commands::Height => {
            println!("{}", client.latest_height().await?);
        }
        Commands::Block { height } => {
            let block = match height {
                Some(height) => client.block_at(height).await?,
                None => client.latest_block().await?,
            };
            println!("{}", serde_json::to_string_pretty(&block)?);
        }
        Commands::Info => {
            let node = client.node_info().await?;
            if node.network != config.chain.chain_id {
                warn!("Node reports network {}, configured chain is {}", node.network, config.chain.chain_id);
            }
            println!("{}", serde_json::to_string_pretty(&node)?);
        }
        Commands::Balance { address } => {
            let balances = client.balances_of(&address).await?;
            print_balances(config, &balances)?;
        }
        Commands::Tx { hash } => {
            let tx = client.transaction_by_hash(&hash).await?;
            println!("{}", serde_json::to_string_pretty(&tx)?);
        }
        Commands::Send { to, amount, memo } => {
            send(config, client, &to, &amount, &memo).await?;
        }
        Commands::Monitor { address } => {
            monitor(config, &client, address.as_deref()).await;
        }
        Commands::Init { .. } | Commands::Generate | Commands::Faucet { .. } => {}
    }
    Ok(())
}

fn print_balances(config: &Config, balances: &BalanceSet) -> Result<()> {
    if balances.is_empty() {
        println!("no balances");
        return Ok(());
    }
    for balance in balances.iter() {
        if balance.denom == config.chain.coin_minimal_denom {
            let display = to_display_units(&balance.amount, config.chain.coin_decimals, DISPLAY_PRECISION)?;
            println!("{} {} ({}{})", display, config.chain.coin_denom, balance.amount, balance.denom);
        } else {
            println!("{}{}", balance.amount, balance.denom);
        }
    }
    Ok(())
}

fn generate(config: &Config) -> Result<()> {
    let mut keys = WalletKeyManager::new(config.chain.address_prefix.as_str());
    let wallet = keys.generate()?;

    println!("address: {}", wallet.address());
    println!("recovery phrase (store it offline, it is shown once):");
    println!("{}", wallet.recovery_phrase());

    keys.disconnect();
    Ok(())
}

async fn faucet(config: &Config, address: &str) -> Result<()> {
    let Some(endpoint) = config.chain.faucet_endpoint.as_deref() else {
        bail!("no faucet_endpoint configured for {}", config.chain.chain_id);
    };

    let faucet = FaucetClient::new(endpoint, &config.chain.address_prefix, config.network.timeout())?;
    if faucet.request_faucet(address).await? {
        println!("faucet request accepted for {}", address);
    } else {
        println!("faucet did not accept the request");
    }
    Ok(())
}

async fn send(config: &Config, client: Arc<ChainQueryClient>, to: &str, amount: &str, memo: &str) -> Result<()> {
    let phrase = Zeroizing::new(
        std::env::var(MNEMONIC_ENV).with_context(|| format!("set {} to the sender's recovery phrase", MNEMONIC_ENV))?,
    );
    let wallet = Wallet::from_mnemonic(&phrase, &config.chain.address_prefix)?;
    let from = wallet.address().to_string();
    let minimal = parse_transfer_amount(amount, config.chain.coin_decimals)?;

    let mut tx_client = TxClient::new(client, config);
    tx_client.set_wallet(wallet);

    info!("Sending {}{} from {} to {}", minimal, config.chain.coin_minimal_denom, from, to);
    let result = tx_client
        .send_transfer(&from, to, &minimal, &config.chain.coin_minimal_denom, memo)
        .await;
    tx_client.clear_wallet();

    let result = result?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn monitor(config: &Config, client: &ChainQueryClient, address: Option<&str>) {
    let mut monitor = ConnectionMonitor::new();
    if let Some(address) = address {
        monitor = monitor.watch_address(address, config.network.balance_poll_interval());
    }

    let mut updates = monitor.subscribe();
    let (stop, stop_rx) = watch::channel(false);

    let report = async {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            info!(
                "state={:?} height={:?} balances={}",
                snapshot.state,
                snapshot.height,
                snapshot.balances.map(|b| b.len()).unwrap_or(0)
            );
        }
    };

    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
        }
        info!("Stopping monitor");
        stop.send_replace(true);
    };

    tokio::select! {
        _ = async { tokio::join!(monitor.run(client, config.network.poll_interval(), stop_rx), interrupt) } => {}
        _ = report => {}
    }
}
