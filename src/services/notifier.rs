//! Report bodies and the send/delete lifecycle of bot messages.
//!
//! Builders only produce Telegram HTML; every interpolated user-controlled
//! string goes through [`escape_html`].

use crate::infrastructure::telegram::{Messenger, SendOptions};
use crate::models::{Chat, ChatId, Message, ParsedPackage, PresenceRecord};
use crate::utils::format::{escape_html, format_bytes};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

pub const NOT_AN_APP: &str = "❌ <b>Not an app (apk, apks)</b>";
pub const ANALYZING: &str = "⏳ <b>Analyzing APK...</b>";
pub const GENERIC_FAILURE: &str = "Failed to analyze the APK. Please try again later.";
pub const MISSING_PACKAGE: &str = "Package name missing in APK manifest.";
pub const BUNDLE_UNSUPPORTED: &str = "Android App Bundle (.apks) files are not supported yet.";

/// Public link to a message: `t.me/{username}/{id}` or, for private
/// `-100...` chats, `t.me/c/{id}/{id}`.
pub fn message_link(chat: &Chat, message_id: i64) -> Option<String> {
    if let Some(username) = chat.username.as_deref().filter(|u| !u.is_empty()) {
        return Some(format!("https://t.me/{}/{}", username, message_id));
    }

    chat.id
        .to_string()
        .strip_prefix("-100")
        .map(|id| format!("https://t.me/c/{}/{}", id, message_id))
}

/// Channel title (or username), linked to the message when the chat is public
pub fn channel_reference(chat: &Chat, message_id: i64) -> Option<String> {
    let title = chat
        .title
        .as_deref()
        .filter(|t| !t.is_empty())
        .or(chat.username.as_deref().filter(|u| !u.is_empty()))?;

    match chat.username.as_deref().filter(|u| !u.is_empty()) {
        Some(username) => Some(format!(
            "<a href=\"https://t.me/{}/{}\">{}</a>",
            username,
            message_id,
            escape_html(title)
        )),
        None => Some(escape_html(title)),
    }
}

pub struct SuccessReport<'a> {
    pub chat: &'a Chat,
    pub message_id: i64,
    pub file_name: &'a str,
    pub file_size: u64,
    pub package: &'a ParsedPackage,
    pub presence: &'a PresenceRecord,
    /// Only set when the file came through the short-lived URL path
    pub direct_url: Option<&'a str>,
}

pub fn success_message(report: &SuccessReport<'_>) -> String {
    let mut parts = vec!["<b>📱 APK Analysis Complete</b>".to_string(), String::new()];

    parts.push(format!(
        "<b>App Name:</b> {}",
        escape_html(&report.package.app_name)
    ));
    parts.push(format!(
        "<b>Package:</b> <code>{}</code>",
        escape_html(&report.package.package_name)
    ));
    parts.push(String::new());

    if report.presence.is_empty() {
        parts.push("<b>📦 Store Links:</b> Not found on Play Store or F-Droid".to_string());
    } else {
        parts.push("<b>📦 Available on:</b>".to_string());
        for link in &report.presence.links {
            parts.push(format!(
                "  • <a href=\"{}\">{}</a>",
                escape_html(&link.url),
                escape_html(link.label())
            ));
        }
    }
    parts.push(String::new());

    let size = format_bytes(report.file_size);
    if size.is_empty() {
        parts.push(format!("<b>File:</b> {}", escape_html(report.file_name)));
    } else {
        parts.push(format!(
            "<b>File:</b> {} ({})",
            escape_html(report.file_name),
            size
        ));
    }

    if let Some(link) = message_link(report.chat, report.message_id) {
        parts.push(format!(
            "<b>🔗 Download Apk:</b> <a href=\"{}\">View in Channel</a>",
            link
        ));
    }

    if let Some(url) = report.direct_url {
        parts.push(format!(
            "<b>📥 Direct Download:</b> <a href=\"{}\">Telegram File</a>",
            escape_html(url)
        ));
    }

    if let Some(reference) = channel_reference(report.chat, report.message_id) {
        parts.push(format!("<b>Source Channel:</b> {}", reference));
    }

    parts.join("\n")
}

pub fn unsupported_message(chat: &Chat, message_id: i64, file_name: &str) -> String {
    let mut parts = vec!["<b>APK Analysis</b>".to_string()];
    if let Some(reference) = channel_reference(chat, message_id) {
        parts.push(format!("<b>Source:</b> {}", reference));
    }
    parts.push(format!("<b>File:</b> {}", escape_html(file_name)));
    parts.push(BUNDLE_UNSUPPORTED.to_string());
    parts.join("\n")
}

pub fn error_message(chat: &Chat, message_id: i64, summary: &str) -> String {
    let mut parts = vec![
        "<b>APK Analysis Failed</b>".to_string(),
        escape_html(summary),
    ];
    if let Some(reference) = channel_reference(chat, message_id) {
        parts.push(format!("<b>Source:</b> {}", reference));
    }
    parts.join("\n")
}

pub fn check_analysis_reply(result_link: &str) -> String {
    format!("<b>👍</b> <a href=\"{}\">Check Analysis</a>", result_link)
}

/// Sends bot messages; failures are logged and never propagated
#[derive(Clone)]
pub struct Notifier {
    messenger: Arc<dyn Messenger>,
}

impl Notifier {
    pub fn new(messenger: Arc<dyn Messenger>) -> Self {
        Self { messenger }
    }

    pub async fn send(&self, chat_id: &ChatId, text: &str, options: SendOptions) -> Option<Message> {
        match self.messenger.send_message(chat_id, text, options).await {
            Ok(message) => Some(message),
            Err(e) => {
                error!("❌ Failed to send Telegram message to {}: {}", chat_id, e);
                None
            }
        }
    }

    /// Sends a notice and schedules its deletion after `ttl`
    pub async fn send_temporary(&self, chat_id: &ChatId, text: &str, ttl: Duration) -> Option<Message> {
        let sent = self.send(chat_id, text, SendOptions::default()).await?;

        let messenger = Arc::clone(&self.messenger);
        let chat_id = chat_id.clone();
        let message_id = sent.message_id;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Err(e) = messenger.delete_message(&chat_id, message_id).await {
                error!("❌ Failed to delete temporary message: {}", e);
            }
        });

        Some(sent)
    }

    pub async fn delete_quiet(&self, chat_id: &ChatId, message_id: i64) {
        match self.messenger.delete_message(chat_id, message_id).await {
            Ok(()) => debug!("🧹 Deleted message {} in {}", message_id, chat_id),
            Err(e) => warn!("Failed to delete message {} in {}: {}", message_id, chat_id, e),
        }
    }
}
