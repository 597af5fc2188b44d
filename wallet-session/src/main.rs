// wallet-session/src/main.rs
// Connects the development wallet to a running backend and reports what happened

use common::{setup_tracing, Config};
use std::sync::Arc;
use wallet_session::{DevWallet, FileStore, RestoreOutcome, WalletProvider, WalletSession};

const DEFAULT_DEV_ADDRESS: &str = "0x71C7656EC7ab88b098defB751B7401B5f6d8976F";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing();

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("Falling back to environment configuration: {}", e);
        Config::from_env()
    });

    let address = std::env::var("DEV_WALLET_ADDRESS").unwrap_or_else(|_| DEFAULT_DEV_ADDRESS.to_string());
    let wallet: Arc<dyn WalletProvider> = Arc::new(DevWallet::new(vec![address], config.network.chain_id));
    let store = Arc::new(FileStore::new(&config.storage.session_file));

    tracing::info!("Using backend at {}", config.api_base_url);
    let session = WalletSession::from_config(config, store, Some(wallet))?;

    let mut notices = session.notices();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            tracing::info!("[{:?}] {}", notice.level, notice.message);
        }
    });

    match session.initialize().await {
        Ok(RestoreOutcome::Restored { address, .. }) => {
            tracing::info!("Resumed session for {}", address);
            return Ok(());
        },
        Ok(_) => {},
        Err(e) => tracing::warn!("Initialization: {}", e),
    }

    let address = session.connect(None, None).await?;
    let snapshot = session.snapshot();
    tracing::info!(
        "Connected {} on chain {:?} (required {})",
        address,
        snapshot.chain_id,
        snapshot.required_chain_id
    );

    Ok(())
}
