use apk_catalog_bot::config::BotConfig;
use apk_catalog_bot::infrastructure::manifest::ApkManifestParser;
use apk_catalog_bot::infrastructure::sheets::{LedgerStore, SheetsClient};
use apk_catalog_bot::infrastructure::telegram::BotApiClient;
use apk_catalog_bot::infrastructure::transfer::{init_transfer, transfer_slot};
use apk_catalog_bot::models::ChatId;
use apk_catalog_bot::services::extractor::ArchiveExtractor;
use apk_catalog_bot::services::ledger::LedgerWriter;
use apk_catalog_bot::services::marketplace::{CatalogEndpoints, PresenceResolver};
use apk_catalog_bot::services::notifier::Notifier;
use apk_catalog_bot::services::pipeline::Pipeline;
use apk_catalog_bot::services::poller::UpdatePoller;
use apk_catalog_bot::services::router::RetrievalRouter;
use clap::Parser;
use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Keep updates queued while the bot was offline instead of dropping them
    #[arg(long)]
    keep_pending: bool,

    /// Long-poll timeout for getUpdates, in seconds
    #[arg(long, default_value_t = 30, env = "POLL_TIMEOUT_SECS")]
    poll_timeout: u64,

    /// Seconds to wait for in-flight uploads on shutdown
    #[arg(long, default_value_t = 300, env = "DRAIN_TIMEOUT_SECS")]
    drain_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "apk_catalog_bot=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting APK Catalog Bot...");

    let config = BotConfig::from_env()?;
    info!(
        "⚙️  Config: Bot API threshold={}MB, download timeout={}s, lookup timeout={}s",
        config.max_bot_api_size / 1024 / 1024,
        config.download_timeout_secs,
        config.lookup_timeout_secs
    );

    // 2. Bot session
    let api = BotApiClient::new(&config.bot_api_url, &config.bot_token)?;
    api.delete_webhook(!args.keep_pending).await?;
    info!("🧹 Webhook cleared (pending updates dropped: {})", !args.keep_pending);

    // 3. Bulk transfer comes up in the background
    let (publisher, transfer) = transfer_slot();
    tokio::spawn(init_transfer(config.transfer_settings(), publisher));

    // 4. Ledger
    let store: Option<Arc<dyn LedgerStore>> = match config.ledger_credentials() {
        Some(creds) => match SheetsClient::from_credentials(&creds) {
            Ok(client) => {
                info!("📒 Google Sheets backup enabled");
                Some(Arc::new(client))
            }
            Err(e) => {
                error!("❌ Google Sheets client setup failed, backup disabled: {}", e);
                None
            }
        },
        None => {
            warn!("⚠️  Google Sheets credentials not set. Backups will be skipped.");
            None
        }
    };

    // 5. Pipeline
    let messenger = Arc::new(api.clone());
    let pipeline = Arc::new(Pipeline::new(
        RetrievalRouter::new(config.max_bot_api_size, messenger.clone(), transfer),
        ArchiveExtractor::new(Arc::new(ApkManifestParser), config.download_timeout()),
        PresenceResolver::new(CatalogEndpoints::default(), config.lookup_timeout())?,
        LedgerWriter::new(store, config.ledger_tz()),
        Notifier::new(messenger),
        ChatId(config.result_channel_id.clone()),
        config.notice_ttl(),
    ));

    // 6. Poll until shutdown; the poller drains in-flight uploads before returning
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let poller = UpdatePoller::new(api, pipeline, args.poll_timeout, shutdown_rx)
        .with_drain_timeout(Duration::from_secs(args.drain_timeout));
    let poller_handle = tokio::spawn(poller.run());

    info!("✅ Bot is running. Listening for uploads...");

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    if let Err(e) = poller_handle.await {
        error!("Update poller task failed: {}", e);
    }

    info!("🛑 Bot shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
