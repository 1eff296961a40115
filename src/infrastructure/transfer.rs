use crate::config::TransferSettings;
use crate::error::{RetrievalError, TelegramError};
use crate::infrastructure::telegram::BotApiClient;
use crate::models::IncomingUpload;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Handle to a message's media on the bulk-transfer side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMedia {
    pub file_path: String,
    pub file_size: Option<u64>,
}

/// Raw-byte transfer for uploads too large for the public Bot API
#[async_trait]
pub trait BulkTransfer: Send + Sync {
    /// Resolves the media of the source message. `Ok(None)` when the message has no media.
    async fn fetch_message(&self, upload: &IncomingUpload)
    -> Result<Option<RemoteMedia>, RetrievalError>;

    /// Downloads the whole media payload into memory
    async fn download_media(&self, media: &RemoteMedia) -> Result<Bytes, RetrievalError>;
}

/// Bulk transfer through a self-hosted Bot API server, which lifts the 20 MiB cap
pub struct LocalBotApiTransfer {
    api: BotApiClient,
}

impl LocalBotApiTransfer {
    /// Authenticates the bot against the transfer server
    pub async fn connect(settings: &TransferSettings) -> Result<Self, TelegramError> {
        let api = BotApiClient::new(&settings.base_url, &settings.bot_token)?;
        api.get_me().await?;

        info!(
            "🔌 Bulk transfer session ready at {} (api_id={})",
            settings.base_url, settings.api_id
        );

        Ok(Self { api })
    }
}

#[async_trait]
impl BulkTransfer for LocalBotApiTransfer {
    async fn fetch_message(
        &self,
        upload: &IncomingUpload,
    ) -> Result<Option<RemoteMedia>, RetrievalError> {
        let Some(document) = &upload.document else {
            return Ok(None);
        };

        match self.api.get_file(&document.file_id).await {
            Ok(file) => Ok(file.file_path.map(|file_path| RemoteMedia {
                file_path,
                file_size: file.file_size,
            })),
            // Unknown or expired file ids come back as 400
            Err(TelegramError::Api { code: 400, description }) => {
                warn!("Transfer server could not resolve media: {}", description);
                Ok(None)
            }
            Err(e) => Err(RetrievalError::Transfer(e.to_string())),
        }
    }

    async fn download_media(&self, media: &RemoteMedia) -> Result<Bytes, RetrievalError> {
        // In --local mode the server hands out absolute paths on a shared volume
        let local = Path::new(&media.file_path);
        if local.is_absolute() {
            return tokio::fs::read(local)
                .await
                .map(Bytes::from)
                .map_err(|e| RetrievalError::Transfer(format!("{}: {}", media.file_path, e)));
        }

        let response = self
            .api
            .http()
            .get(self.api.file_url(&media.file_path))
            .send()
            .await
            .map_err(|e| RetrievalError::Transfer(e.without_url().to_string()))?;

        if !response.status().is_success() {
            return Err(RetrievalError::Transfer(format!(
                "media download returned {}",
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| RetrievalError::Transfer(e.without_url().to_string()))
    }
}

pub type SharedTransfer = Arc<dyn BulkTransfer>;

/// Publishing side of the transfer readiness slot
pub struct TransferPublisher {
    tx: watch::Sender<Option<SharedTransfer>>,
}

impl TransferPublisher {
    pub fn publish(&self, client: SharedTransfer) {
        self.tx.send_replace(Some(client));
    }
}

/// Read side, cloned into every pipeline. Re-read per invocation so a late
/// initialization becomes visible without restarting.
#[derive(Clone)]
pub struct TransferHandle {
    rx: watch::Receiver<Option<SharedTransfer>>,
}

impl TransferHandle {
    pub fn current(&self) -> Option<SharedTransfer> {
        self.rx.borrow().clone()
    }

    /// A handle that is already resolved (or permanently unavailable)
    pub fn fixed(client: Option<SharedTransfer>) -> Self {
        let (_tx, rx) = watch::channel(client);
        Self { rx }
    }
}

pub fn transfer_slot() -> (TransferPublisher, TransferHandle) {
    let (tx, rx) = watch::channel(None);
    (TransferPublisher { tx }, TransferHandle { rx })
}

const CONNECT_ATTEMPTS: u32 = 5;

/// Connects the bulk-transfer client in the background and publishes it once ready.
/// On failure the bot keeps running in small-file-only mode.
pub async fn init_transfer(settings: Option<TransferSettings>, publisher: TransferPublisher) {
    let Some(settings) = settings else {
        warn!("⚠️  API_ID/API_HASH not set. Large files (>20MB) will not be retrievable.");
        return;
    };

    for attempt in 1..=CONNECT_ATTEMPTS {
        match LocalBotApiTransfer::connect(&settings).await {
            Ok(client) => {
                publisher.publish(Arc::new(client));
                info!("✅ Bulk transfer client initialized");
                return;
            }
            Err(e) => {
                warn!(
                    "Bulk transfer connect attempt {}/{} failed: {}",
                    attempt, CONNECT_ATTEMPTS, e
                );
                if attempt < CONNECT_ATTEMPTS {
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                }
            }
        }
    }

    warn!("⚠️  Bulk transfer unavailable, continuing in small-file-only mode");
}
