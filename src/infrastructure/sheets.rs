use crate::config::LedgerCredentials;
use crate::error::LedgerError;
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4";

/// Header row lives in a fixed range so re-writing it is an idempotent overwrite
const HEADER_RANGE: &str = "A1:F1";

/// Remote append-only table backing the ledger
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// First row of the first sheet; empty when the sheet has no header
    async fn header_row(&self) -> Result<Vec<String>, LedgerError>;

    async fn write_header(&self, header: &[&str]) -> Result<(), LedgerError>;

    async fn append_row(&self, cells: Vec<String>) -> Result<(), LedgerError>;
}

#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, LedgerError>;
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expiry")]
    expires_in: u64,
}

fn default_expiry() -> u64 {
    3600
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// OAuth2 service-account flow: a signed RS256 JWT exchanged for an access token
pub struct ServiceAccountAuth {
    http: reqwest::Client,
    email: String,
    key: EncodingKey,
    token_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub fn new(email: &str, private_key_pem: &str, token_url: &str) -> Result<Self, LedgerError> {
        let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())?;

        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            email: email.to_string(),
            key,
            token_url: token_url.to_string(),
            cached: Mutex::new(None),
        })
    }

    fn assertion(&self) -> Result<String, LedgerError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.email,
            scope: SHEETS_SCOPE,
            aud: &self.token_url,
            iat: now,
            exp: now + 3600,
        };

        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.key,
        )?)
    }
}

#[async_trait]
impl AccessTokenProvider for ServiceAccountAuth {
    async fn access_token(&self) -> Result<String, LedgerError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
        }

        let assertion = self.assertion()?;
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LedgerError::Auth(format!("{}: {}", status, body)));
        }

        let token: TokenResponse = response.json().await?;
        // Refresh a minute early
        let lifetime = Duration::from_secs(token.expires_in.saturating_sub(60));
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

/// Google Sheets v4 values API
pub struct SheetsClient {
    http: reqwest::Client,
    base_url: String,
    sheet_id: String,
    auth: Arc<dyn AccessTokenProvider>,
}

impl SheetsClient {
    pub fn new(
        base_url: &str,
        sheet_id: &str,
        auth: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self, LedgerError> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            sheet_id: sheet_id.to_string(),
            auth,
        })
    }

    /// Production client from configured service-account credentials
    pub fn from_credentials(creds: &LedgerCredentials) -> Result<Self, LedgerError> {
        let auth = ServiceAccountAuth::new(
            &creds.service_account_email,
            &creds.private_key,
            TOKEN_URL,
        )?;
        Self::new(SHEETS_API_URL, &creds.sheet_id, Arc::new(auth))
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/spreadsheets/{}/values/{}",
            self.base_url, self.sheet_id, range
        )
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, LedgerError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(LedgerError::Api { status, body })
    }
}

#[async_trait]
impl LedgerStore for SheetsClient {
    async fn header_row(&self) -> Result<Vec<String>, LedgerError> {
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .get(self.values_url(HEADER_RANGE))
            .bearer_auth(token)
            .send()
            .await?;

        let range: ValueRange = Self::check(response).await?.json().await?;
        Ok(range
            .values
            .into_iter()
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(|v| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect())
    }

    async fn write_header(&self, header: &[&str]) -> Result<(), LedgerError> {
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .put(self.values_url(HEADER_RANGE))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(token)
            .json(&json!({
                "range": HEADER_RANGE,
                "majorDimension": "ROWS",
                "values": [header],
            }))
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    async fn append_row(&self, cells: Vec<String>) -> Result<(), LedgerError> {
        let token = self.auth.access_token().await?;
        let response = self
            .http
            .post(format!("{}:append", self.values_url(HEADER_RANGE)))
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .bearer_auth(token)
            .json(&json!({
                "majorDimension": "ROWS",
                "values": [cells],
            }))
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}
