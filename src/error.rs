use thiserror::Error;

/// Why an inbound message never entered the analysis pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotApplicable {
    #[error("Message has no document attached")]
    NoDocument,

    #[error("Unsupported file extension: {0}")]
    UnsupportedExtension(String),
}

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Bot API error {code}: {description}")]
    Api { code: i64, description: String },

    #[error("Bot API returned no result for {0}")]
    EmptyResult(&'static str),
}

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Bot API file lookup failed: {0}")]
    BotApi(#[from] TelegramError),

    #[error("Bulk transfer client is not available")]
    TransferUnavailable,

    #[error("Could not fetch message or media not found (chat {chat_id}, message {message_id})")]
    MediaNotFound { chat_id: i64, message_id: i64 },

    #[error("Bulk transfer failed: {0}")]
    Transfer(String),

    #[error("Download returned an empty payload")]
    EmptyPayload,

    #[error("Download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("Download timed out after {0} seconds")]
    Timeout(u64),
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Archive unreadable: {0}")]
    Archive(String),

    #[error("Manifest unreadable: {0}")]
    Manifest(String),

    #[error("Package name missing in manifest")]
    MissingPackage,
}

/// Failure of the retrieval + extraction half of the pipeline.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Workspace error: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("Analysis task aborted: {0}")]
    Aborted(String),
}

impl AnalysisError {
    pub fn is_missing_package(&self) -> bool {
        matches!(self, AnalysisError::Parse(ParseError::MissingPackage))
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Signing error: {0}")]
    Key(#[from] jsonwebtoken::errors::Error),

    #[error("Token exchange failed: {0}")]
    Auth(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Sheets API error {status}: {body}")]
    Api { status: u16, body: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} is not set in the environment")]
    Missing(&'static str),

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}
