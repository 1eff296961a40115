use crate::error::TelegramError;
use crate::models::{ChatId, Message, TelegramFile, Update};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

/// Options for an outbound message
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub disable_web_page_preview: bool,
    pub reply_to_message_id: Option<i64>,
}

/// The subset of the messaging platform the pipeline talks to
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Resolves a short-lived direct-download URL for a small file
    async fn file_download_url(&self, file_id: &str) -> Result<String, TelegramError>;

    /// Sends an HTML message
    async fn send_message(
        &self,
        chat_id: &ChatId,
        text: &str,
        options: SendOptions,
    ) -> Result<Message, TelegramError>;

    async fn delete_message(&self, chat_id: &ChatId, message_id: i64) -> Result<(), TelegramError>;
}

#[derive(serde::Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

/// Thin Bot API client over reqwest
#[derive(Clone)]
pub struct BotApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl BotApiClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, TelegramError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// `{base}/file/bot{token}/{path}`
    pub fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{}",
            self.base_url,
            self.token,
            file_path.trim_start_matches('/')
        )
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    async fn call<P, T>(
        &self,
        method: &'static str,
        params: &P,
        timeout: Option<Duration>,
    ) -> Result<T, TelegramError>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/bot{}/{}", self.base_url, self.token, method);
        let mut request = self.http.post(&url).json(params);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        // Bot API reports failures in the body with a non-2xx status, so read it either way.
        // The request URL carries the token and must not end up in error text.
        let response: ApiResponse<T> = request
            .send()
            .await
            .map_err(reqwest::Error::without_url)?
            .json()
            .await
            .map_err(reqwest::Error::without_url)?;

        if !response.ok {
            return Err(TelegramError::Api {
                code: response.error_code.unwrap_or_default(),
                description: response.description.unwrap_or_default(),
            });
        }

        response.result.ok_or(TelegramError::EmptyResult(method))
    }

    pub async fn get_me(&self) -> Result<serde_json::Value, TelegramError> {
        self.call("getMe", &json!({}), None).await
    }

    pub async fn delete_webhook(&self, drop_pending_updates: bool) -> Result<bool, TelegramError> {
        self.call(
            "deleteWebhook",
            &json!({ "drop_pending_updates": drop_pending_updates }),
            None,
        )
        .await
    }

    /// Long-polls for `message` and `channel_post` updates
    pub async fn get_updates(
        &self,
        offset: i64,
        poll_timeout_secs: u64,
    ) -> Result<Vec<Update>, TelegramError> {
        let params = json!({
            "offset": offset,
            "timeout": poll_timeout_secs,
            "allowed_updates": ["message", "channel_post"],
        });
        self.call(
            "getUpdates",
            &params,
            Some(Duration::from_secs(poll_timeout_secs + 10)),
        )
        .await
    }

    pub async fn get_file(&self, file_id: &str) -> Result<TelegramFile, TelegramError> {
        self.call("getFile", &json!({ "file_id": file_id }), None)
            .await
    }
}

#[async_trait]
impl Messenger for BotApiClient {
    async fn file_download_url(&self, file_id: &str) -> Result<String, TelegramError> {
        let file = self.get_file(file_id).await?;
        let path = file
            .file_path
            .ok_or(TelegramError::EmptyResult("getFile.file_path"))?;
        Ok(self.file_url(&path))
    }

    async fn send_message(
        &self,
        chat_id: &ChatId,
        text: &str,
        options: SendOptions,
    ) -> Result<Message, TelegramError> {
        let mut params = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML",
            "disable_web_page_preview": options.disable_web_page_preview,
        });
        if let Some(reply_to) = options.reply_to_message_id {
            params["reply_to_message_id"] = json!(reply_to);
        }

        self.call("sendMessage", &params, None).await
    }

    async fn delete_message(&self, chat_id: &ChatId, message_id: i64) -> Result<(), TelegramError> {
        let _: bool = self
            .call(
                "deleteMessage",
                &json!({ "chat_id": chat_id, "message_id": message_id }),
                None,
            )
            .await?;
        Ok(())
    }
}
