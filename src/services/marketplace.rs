use crate::models::{Catalog, PresenceRecord, StoreLink};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const PLAY_STORE_APP_URL: &str = "https://play.google.com/store/apps/details";
pub const FDROID_PACKAGE_API_URL: &str = "https://f-droid.org/api/v1/packages";
pub const FDROID_PACKAGE_PAGE_URL: &str = "https://f-droid.org/packages";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Same unreserved set as JavaScript's `encodeURIComponent`
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn encode_component(input: &str) -> String {
    utf8_percent_encode(input, COMPONENT).to_string()
}

#[derive(Debug, Clone)]
pub struct CatalogEndpoints {
    pub play_app_url: String,
    pub fdroid_api_url: String,
    pub fdroid_page_url: String,
}

impl Default for CatalogEndpoints {
    fn default() -> Self {
        Self {
            play_app_url: PLAY_STORE_APP_URL.to_string(),
            fdroid_api_url: FDROID_PACKAGE_API_URL.to_string(),
            fdroid_page_url: FDROID_PACKAGE_PAGE_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FdroidPackage {
    #[serde(rename = "packageName")]
    package_name: Option<String>,
}

/// Checks which public catalogs list a package
pub struct PresenceResolver {
    http: reqwest::Client,
    endpoints: CatalogEndpoints,
}

impl PresenceResolver {
    pub fn new(endpoints: CatalogEndpoints, lookup_timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(lookup_timeout).build()?;
        Ok(Self { http, endpoints })
    }

    /// Queries both catalogs concurrently. Never fails: a catalog that cannot
    /// be reached is reported as absent.
    pub async fn resolve(&self, package_name: &str) -> PresenceRecord {
        let (play, fdroid) = tokio::join!(
            self.check_play_store(package_name),
            self.check_fdroid(package_name)
        );

        let links = [(Catalog::GooglePlay, play), (Catalog::FDroid, fdroid)]
            .into_iter()
            .filter_map(|(catalog, url)| url.map(|url| StoreLink { catalog, url }))
            .collect();

        PresenceRecord { links }
    }

    async fn check_play_store(&self, package_name: &str) -> Option<String> {
        let url = format!(
            "{}?id={}&hl=en_US&gl=US",
            self.endpoints.play_app_url,
            encode_component(package_name)
        );

        let response = self
            .http
            .get(&url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT, "text/html")
            .send()
            .await;

        match response {
            Ok(r) if r.status() == StatusCode::OK => Some(url),
            Ok(r) if r.status() == StatusCode::NOT_FOUND => {
                debug!("Play Store has no listing for {}", package_name);
                None
            }
            Ok(r) => {
                warn!("Play Store lookup failed for {}: status {}", package_name, r.status());
                None
            }
            Err(e) => {
                warn!("Play Store lookup failed for {}: {}", package_name, e);
                None
            }
        }
    }

    async fn check_fdroid(&self, package_name: &str) -> Option<String> {
        let encoded = encode_component(package_name);
        let api_url = format!("{}/{}", self.endpoints.fdroid_api_url, encoded);

        let response = match self.http.get(&api_url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("F-Droid lookup failed for {}: {}", package_name, e);
                return None;
            }
        };

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                debug!("F-Droid has no listing for {}", package_name);
                return None;
            }
            status => {
                warn!("F-Droid lookup failed for {}: status {}", package_name, status);
                return None;
            }
        }

        let body: FdroidPackage = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!("F-Droid lookup failed for {}: {}", package_name, e);
                return None;
            }
        };

        let matches = body
            .package_name
            .is_some_and(|p| p.eq_ignore_ascii_case(package_name));

        matches.then(|| format!("{}/{}/", self.endpoints.fdroid_page_url, encoded))
    }
}
