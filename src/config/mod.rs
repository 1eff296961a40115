use crate::error::ConfigError;
use std::env;
use std::time::Duration;

/// Default size limit of the public Bot API file download (20 MiB)
pub const MAX_BOT_API_SIZE: u64 = 20 * 1024 * 1024;

/// Runtime configuration for the bot
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Bot credential (Required)
    pub bot_token: String,

    /// Chat that receives analysis reports (Required)
    pub result_channel_id: String,

    /// Bot API base URL (default: "https://api.telegram.org")
    pub bot_api_url: String,

    /// Application id for the bulk-transfer session
    pub api_id: Option<i32>,
    /// Application hash for the bulk-transfer session
    pub api_hash: Option<String>,
    /// Self-hosted Bot API server used for large files (default: "http://127.0.0.1:8081")
    pub transfer_api_url: String,

    /// Uploads above this size go through the bulk-transfer client (default: 20 MiB)
    pub max_bot_api_size: u64,

    /// Timeout for streaming a small file to disk (default: 240 s)
    pub download_timeout_secs: u64,

    /// Per-catalog lookup timeout (default: 10 s)
    pub lookup_timeout_secs: u64,

    /// Lifetime of the "not an app" notice (default: 3000 ms)
    pub notice_ttl_ms: u64,

    /// Ledger spreadsheet id
    pub google_sheet_id: Option<String>,
    /// Service account email for the ledger
    pub google_service_account_email: Option<String>,
    /// Service account private key (PEM)
    pub google_private_key: Option<String>,
    /// Time zone used for ledger timestamps (default: "Asia/Kolkata")
    pub ledger_timezone: String,
}

/// Credentials for the ledger, present only when fully configured
#[derive(Debug, Clone)]
pub struct LedgerCredentials {
    pub sheet_id: String,
    pub service_account_email: String,
    pub private_key: String,
}

/// Identity for the bulk-transfer client, present only when fully configured
#[derive(Debug, Clone)]
pub struct TransferSettings {
    pub api_id: i32,
    pub base_url: String,
    pub bot_token: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            result_channel_id: String::new(),
            bot_api_url: "https://api.telegram.org".to_string(),
            api_id: None,
            api_hash: None,
            transfer_api_url: "http://127.0.0.1:8081".to_string(),
            max_bot_api_size: MAX_BOT_API_SIZE,
            download_timeout_secs: 4 * 60,
            lookup_timeout_secs: 10,
            notice_ttl_ms: 3000,
            google_sheet_id: None,
            google_service_account_email: None,
            google_private_key: None,
            ledger_timezone: "Asia/Kolkata".to_string(),
        }
    }
}

impl BotConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let default = Self::default();

        let bot_token = non_empty("BOT_TOKEN").ok_or(ConfigError::Missing("BOT_TOKEN"))?;
        let result_channel_id =
            non_empty("RESULT_CHANNEL_ID").ok_or(ConfigError::Missing("RESULT_CHANNEL_ID"))?;

        let api_id = match non_empty("API_ID") {
            Some(v) => Some(v.parse().map_err(|_| ConfigError::Invalid {
                name: "API_ID",
                value: v.clone(),
            })?),
            None => None,
        };

        let ledger_timezone = env::var("LEDGER_TIMEZONE").unwrap_or(default.ledger_timezone);
        if ledger_timezone.parse::<chrono_tz::Tz>().is_err() {
            return Err(ConfigError::Invalid {
                name: "LEDGER_TIMEZONE",
                value: ledger_timezone,
            });
        }

        Ok(Self {
            bot_token,
            result_channel_id,
            bot_api_url: env::var("BOT_API_URL").unwrap_or(default.bot_api_url),
            api_id,
            api_hash: non_empty("API_HASH"),
            transfer_api_url: env::var("TRANSFER_API_URL").unwrap_or(default.transfer_api_url),

            max_bot_api_size: env::var("MAX_BOT_API_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_bot_api_size),

            download_timeout_secs: env::var("DOWNLOAD_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.download_timeout_secs),

            lookup_timeout_secs: env::var("LOOKUP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.lookup_timeout_secs),

            notice_ttl_ms: env::var("NOTICE_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.notice_ttl_ms),

            google_sheet_id: non_empty("GOOGLE_SHEET_ID"),
            google_service_account_email: non_empty("GOOGLE_SERVICE_ACCOUNT_EMAIL"),
            // Keys pasted into .env usually carry escaped newlines
            google_private_key: non_empty("GOOGLE_PRIVATE_KEY").map(|k| k.replace("\\n", "\n")),
            ledger_timezone,
        })
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    pub fn notice_ttl(&self) -> Duration {
        Duration::from_millis(self.notice_ttl_ms)
    }

    pub fn ledger_credentials(&self) -> Option<LedgerCredentials> {
        Some(LedgerCredentials {
            sheet_id: self.google_sheet_id.clone()?,
            service_account_email: self.google_service_account_email.clone()?,
            private_key: self.google_private_key.clone()?,
        })
    }

    /// The hash only gates the feature; the transfer server holds its own copy
    pub fn transfer_settings(&self) -> Option<TransferSettings> {
        self.api_hash.as_ref()?;
        Some(TransferSettings {
            api_id: self.api_id?,
            base_url: self.transfer_api_url.clone(),
            bot_token: self.bot_token.clone(),
        })
    }

    pub fn ledger_tz(&self) -> chrono_tz::Tz {
        self.ledger_timezone
            .parse()
            .unwrap_or(chrono_tz::Asia::Kolkata)
    }
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
