use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Bot API wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub channel_post: Option<Message>,
}

impl Update {
    /// Regular messages and channel posts go through the same handler
    pub fn into_message(self) -> Option<Message> {
        self.channel_post.or(self.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub document: Option<Document>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramFile {
    pub file_id: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub file_path: Option<String>,
}

/// Target chat: numeric id (`-100...`) or `@channel` handle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChatId(pub String);

impl From<i64> for ChatId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ChatId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Pipeline types
// ---------------------------------------------------------------------------

/// Declared metadata of an uploaded document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMeta {
    pub file_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
}

/// One inbound message as seen by the pipeline
#[derive(Debug, Clone)]
pub struct IncomingUpload {
    pub chat: Chat,
    pub message_id: i64,
    pub document: Option<DocumentMeta>,
}

impl From<Message> for IncomingUpload {
    fn from(msg: Message) -> Self {
        let document = msg.document.map(|d| DocumentMeta {
            file_id: d.file_id,
            file_name: d.file_name.unwrap_or_default(),
            file_size: d.file_size.unwrap_or(0),
            mime_type: d.mime_type.unwrap_or_default(),
        });

        Self {
            chat: msg.chat,
            message_id: msg.message_id,
            document,
        }
    }
}

/// Where the retrieved archive lives. Exactly one variant at a time.
#[derive(Debug, Clone)]
pub enum FileLocation {
    /// Short-lived direct-download URL (small files)
    Url(String),
    /// Bytes pulled through the bulk-transfer client (large files)
    Buffer(Bytes),
}

#[derive(Debug, Clone)]
pub struct RetrievedFile {
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
    pub location: FileLocation,
}

impl RetrievedFile {
    pub fn direct_url(&self) -> Option<&str> {
        match &self.location {
            FileLocation::Url(url) => Some(url),
            FileLocation::Buffer(_) => None,
        }
    }
}

/// Raw manifest fields as returned by a parser
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub package: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPackage {
    pub package_name: String,
    pub app_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Catalog {
    GooglePlay,
    FDroid,
}

impl Catalog {
    pub fn label(&self) -> &'static str {
        match self {
            Catalog::GooglePlay => "Google Play",
            Catalog::FDroid => "F-Droid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLink {
    pub catalog: Catalog,
    pub url: String,
}

impl StoreLink {
    pub fn label(&self) -> &'static str {
        self.catalog.label()
    }
}

/// Store links in catalog query order; absent catalogs are omitted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceRecord {
    pub links: Vec<StoreLink>,
}

impl PresenceRecord {
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn url_for(&self, catalog: Catalog) -> Option<&str> {
        self.links
            .iter()
            .find(|l| l.catalog == catalog)
            .map(|l| l.url.as_str())
    }
}

pub const LEDGER_HEADER: [&str; 6] = [
    "File Name",
    "Package Name",
    "Google Play Link",
    "F-Droid Link",
    "File Size",
    "Time",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRow {
    pub file_name: String,
    pub package_name: String,
    pub google_play_link: String,
    pub f_droid_link: String,
    pub file_size_label: String,
    pub timestamp: String,
}

impl LedgerRow {
    /// Cells in `LEDGER_HEADER` order
    pub fn to_cells(&self) -> Vec<String> {
        vec![
            self.file_name.clone(),
            self.package_name.clone(),
            self.google_play_link.clone(),
            self.f_droid_link.clone(),
            self.file_size_label.clone(),
            self.timestamp.clone(),
        ]
    }
}
