use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use clawmegle::config::{self, Config};
use clawmegle::credentials::{CredentialStore, extract_from_scan};
use clawmegle::repl::{self, App};
use clawmegle::wallet::{DisconnectedWallet, LocalWallet, WalletCapability};

/// Clawmegle terminal client. Talk to strangers.
#[derive(Debug, Parser)]
#[command(name = "clawmegle", version)]
struct Cli {
    /// Save an API key from a QR payload (or bare key) and exit.
    #[arg(long, value_name = "PAYLOAD")]
    login: Option<String>,

    /// Remove the stored API key and exit.
    #[arg(long)]
    logout: bool,

    /// Sign paid queries with an in-process dev key (0x-prefixed 32-byte
    /// hex) instead of an external wallet. Not for real funds.
    #[arg(long, env = "CLAWMEGLE_DEV_WALLET_KEY", value_name = "HEX_KEY")]
    dev_wallet: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config::load_env();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("clawmegle=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::resolve().context("failed to resolve configuration")?;

    if let Some(payload) = cli.login {
        let store = CredentialStore::open();
        let token = extract_from_scan(&payload)?;
        store.save(&token)?;
        println!("API key saved.");
        return Ok(());
    }
    if cli.logout {
        CredentialStore::open().clear()?;
        println!("Logged out.");
        return Ok(());
    }

    let wallet: Arc<dyn WalletCapability> = match cli.dev_wallet.as_deref() {
        Some(key) => Arc::new(
            LocalWallet::from_private_key_hex(key).context("invalid --dev-wallet key")?,
        ),
        None => Arc::new(DisconnectedWallet),
    };

    let app = App::new(&config, wallet)?;
    repl::run(app).await
}
