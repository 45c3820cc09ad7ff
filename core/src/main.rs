/// Courier inspection tool - prints what a data directory still holds
use courier_core::identity;
use courier_core::pending_cache::PendingMessageCache;
use courier_core::shared_config::DumpStore;
use courier_core::{Config, KvStore, SledStore};
use std::env;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let store: Arc<dyn KvStore> = Arc::new(
        SledStore::open(&config.data_dir)
            .map_err(|e| anyhow::anyhow!("Failed to open store: {}", e))?,
    );
    info!(data_dir = %config.data_dir.display(), "Opened store");

    match identity::load(&config.data_dir)? {
        Some(account) => println!("Account: {}", account.pubkey),
        None => println!("Account: <none>"),
    }

    let cache = PendingMessageCache::load(store.clone())?;
    let devices = cache.get_devices().await;
    println!("Pending messages: {}", cache.len().await);
    for device in &devices {
        let pending = cache.get_for_device(device).await;
        println!("  {} ({})", device, pending.len());
        for entry in pending {
            println!(
                "    {} {} ns={}{}",
                entry.id(),
                entry.message.kind,
                entry.namespace,
                if entry.is_group { " group" } else { "" }
            );
        }
    }

    let dumps = DumpStore::new(store).load_all()?;
    println!("Config dumps: {}", dumps.len());
    for dump in dumps {
        println!("  {} {} ({} bytes)", dump.owner, dump.variant, dump.data.len());
    }

    Ok(())
}
