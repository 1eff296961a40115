#![allow(dead_code)]

use apk_catalog_bot::error::{LedgerError, ParseError, RetrievalError, TelegramError};
use apk_catalog_bot::infrastructure::manifest::ManifestParser;
use apk_catalog_bot::infrastructure::sheets::LedgerStore;
use apk_catalog_bot::infrastructure::telegram::{Messenger, SendOptions};
use apk_catalog_bot::infrastructure::transfer::{BulkTransfer, RemoteMedia, TransferHandle};
use apk_catalog_bot::models::{Chat, ChatId, DocumentMeta, IncomingUpload, Manifest, Message};
use apk_catalog_bot::services::extractor::ArchiveExtractor;
use apk_catalog_bot::services::ledger::LedgerWriter;
use apk_catalog_bot::services::marketplace::{CatalogEndpoints, PresenceResolver};
use apk_catalog_bot::services::notifier::Notifier;
use apk_catalog_bot::services::pipeline::Pipeline;
use apk_catalog_bot::services::router::RetrievalRouter;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const RESULT_CHAT: &str = "-1009990001";
pub const SOURCE_CHAT: i64 = -1001234567;
pub const MB: u64 = 1024 * 1024;

/// Smallest payload that passes the ZIP signature check
pub const FAKE_APK: &[u8] = b"PK\x03\x04fake-apk-body";

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub chat_id: String,
    pub message_id: i64,
    pub text: String,
    pub reply_to: Option<i64>,
    pub disable_preview: bool,
}

/// Messenger that records everything. Fails only when told to.
pub struct RecordingMessenger {
    file_base: String,
    next_id: AtomicI64,
    pub url_requests: AtomicUsize,
    pub sent: Mutex<Vec<SentMessage>>,
    /// Every delete attempt, including failed ones
    pub deleted: Mutex<Vec<(String, i64)>>,
    /// Sends to this chat are rejected
    pub fail_sends_to: Mutex<Option<String>>,
    pub fail_deletes: AtomicBool,
}

impl RecordingMessenger {
    pub fn new(file_base: &str) -> Self {
        Self {
            file_base: file_base.trim_end_matches('/').to_string(),
            next_id: AtomicI64::new(1000),
            url_requests: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            fail_sends_to: Mutex::new(None),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: &str) -> Vec<SentMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.chat_id == chat_id)
            .collect()
    }

    pub fn deleted(&self) -> Vec<(String, i64)> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn file_download_url(&self, file_id: &str) -> Result<String, TelegramError> {
        self.url_requests.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}/file/bot1:t/documents/{}", self.file_base, file_id))
    }

    async fn send_message(
        &self,
        chat_id: &ChatId,
        text: &str,
        options: SendOptions,
    ) -> Result<Message, TelegramError> {
        if self.fail_sends_to.lock().unwrap().as_deref() == Some(chat_id.0.as_str()) {
            return Err(TelegramError::Api {
                code: 403,
                description: "Forbidden: bot is not a member of the channel chat".to_string(),
            });
        }

        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().unwrap().push(SentMessage {
            chat_id: chat_id.to_string(),
            message_id,
            text: text.to_string(),
            reply_to: options.reply_to_message_id,
            disable_preview: options.disable_web_page_preview,
        });

        Ok(Message {
            message_id,
            chat: Chat {
                id: chat_id.0.parse().unwrap_or_default(),
                ..Chat::default()
            },
            document: None,
        })
    }

    async fn delete_message(&self, chat_id: &ChatId, message_id: i64) -> Result<(), TelegramError> {
        self.deleted
            .lock()
            .unwrap()
            .push((chat_id.to_string(), message_id));

        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(TelegramError::Api {
                code: 400,
                description: "Bad Request: message can't be deleted".to_string(),
            });
        }
        Ok(())
    }
}

/// Bulk transfer that always resolves the media and returns a fixed payload
pub struct FakeTransfer {
    pub payload: Bytes,
}

#[async_trait]
impl BulkTransfer for FakeTransfer {
    async fn fetch_message(
        &self,
        upload: &IncomingUpload,
    ) -> Result<Option<RemoteMedia>, RetrievalError> {
        Ok(Some(RemoteMedia {
            file_path: format!("documents/{}", upload.message_id),
            file_size: Some(self.payload.len() as u64),
        }))
    }

    async fn download_media(&self, _media: &RemoteMedia) -> Result<Bytes, RetrievalError> {
        Ok(self.payload.clone())
    }
}

/// Bulk transfer that takes its time before handing over the payload
pub struct SlowTransfer {
    pub payload: Bytes,
    pub delay: Duration,
}

#[async_trait]
impl BulkTransfer for SlowTransfer {
    async fn fetch_message(
        &self,
        upload: &IncomingUpload,
    ) -> Result<Option<RemoteMedia>, RetrievalError> {
        Ok(Some(RemoteMedia {
            file_path: format!("documents/{}", upload.message_id),
            file_size: Some(self.payload.len() as u64),
        }))
    }

    async fn download_media(&self, _media: &RemoteMedia) -> Result<Bytes, RetrievalError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.payload.clone())
    }
}

pub enum FakeParser {
    Returns(Manifest),
    Panics,
}

impl FakeParser {
    pub fn package(package: &str, label: &str) -> Self {
        FakeParser::Returns(Manifest {
            package: Some(package.to_string()),
            label: Some(label.to_string()),
        })
    }
}

impl ManifestParser for FakeParser {
    fn parse(&self, path: &Path) -> Result<Manifest, ParseError> {
        assert!(path.exists(), "archive not materialized at {:?}", path);
        match self {
            FakeParser::Returns(manifest) => Ok(manifest.clone()),
            FakeParser::Panics => panic!("manifest decoder blew up"),
        }
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    pub header: Mutex<Vec<String>>,
    pub rows: Mutex<Vec<Vec<String>>>,
}

impl MemoryLedger {
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn header_row(&self) -> Result<Vec<String>, LedgerError> {
        Ok(self.header.lock().unwrap().clone())
    }

    async fn write_header(&self, header: &[&str]) -> Result<(), LedgerError> {
        *self.header.lock().unwrap() = header.iter().map(|s| s.to_string()).collect();
        Ok(())
    }

    async fn append_row(&self, cells: Vec<String>) -> Result<(), LedgerError> {
        self.rows.lock().unwrap().push(cells);
        Ok(())
    }
}

/// Everything a pipeline test needs to inspect afterwards
pub struct Harness {
    pub messenger: Arc<RecordingMessenger>,
    pub ledger: Arc<MemoryLedger>,
    pub pipeline: Arc<Pipeline>,
}

pub struct HarnessOptions {
    /// Base URL for both file downloads and catalog lookups
    pub server_url: String,
    pub parser: FakeParser,
    pub transfer: TransferHandle,
    pub workspace_root: std::path::PathBuf,
    pub notice_ttl: Duration,
}

pub fn harness(options: HarnessOptions) -> Harness {
    let messenger = Arc::new(RecordingMessenger::new(&options.server_url));
    let ledger = Arc::new(MemoryLedger::default());

    let pipeline = Pipeline::new(
        RetrievalRouter::new(20 * MB, messenger.clone(), options.transfer),
        ArchiveExtractor::new(Arc::new(options.parser), Duration::from_secs(10))
            .with_workspace_root(&options.workspace_root),
        PresenceResolver::new(
            CatalogEndpoints {
                play_app_url: format!("{}/store/apps/details", options.server_url),
                fdroid_api_url: format!("{}/api/v1/packages", options.server_url),
                fdroid_page_url: "https://f-droid.org/packages".to_string(),
            },
            Duration::from_secs(2),
        )
        .unwrap(),
        LedgerWriter::new(
            Some(ledger.clone() as Arc<dyn LedgerStore>),
            chrono_tz::Asia::Kolkata,
        ),
        Notifier::new(messenger.clone()),
        ChatId::from(RESULT_CHAT),
        options.notice_ttl,
    );

    Harness {
        messenger,
        ledger,
        pipeline: Arc::new(pipeline),
    }
}

pub fn upload(file_name: &str, file_size: u64) -> IncomingUpload {
    IncomingUpload {
        chat: Chat {
            id: SOURCE_CHAT,
            username: Some("apkdrops".to_string()),
            title: Some("APK Drops".to_string()),
        },
        message_id: 77,
        document: Some(DocumentMeta {
            file_id: format!("file-{}", file_name),
            file_name: file_name.to_string(),
            file_size,
            mime_type: "application/vnd.android.package-archive".to_string(),
        }),
    }
}

pub fn workspace_is_empty(root: &Path) -> bool {
    std::fs::read_dir(root)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
