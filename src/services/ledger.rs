use crate::error::LedgerError;
use crate::infrastructure::sheets::LedgerStore;
use crate::models::{Catalog, LEDGER_HEADER, LedgerRow, ParsedPackage, PresenceRecord};
use crate::utils::format::{format_bytes, format_timestamp};
use chrono::Utc;
use chrono_tz::Tz;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerStatus {
    Written,
    /// No credentials configured
    Skipped,
    /// Logged and swallowed
    Failed,
}

/// Appends one backup row per analyzed upload. Never fails the caller.
pub struct LedgerWriter {
    store: Option<Arc<dyn LedgerStore>>,
    tz: Tz,
    header_ready: AtomicBool,
    header_lock: Mutex<()>,
}

impl LedgerWriter {
    pub fn new(store: Option<Arc<dyn LedgerStore>>, tz: Tz) -> Self {
        Self {
            store,
            tz,
            header_ready: AtomicBool::new(false),
            header_lock: Mutex::new(()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, chrono_tz::Asia::Kolkata)
    }

    pub fn build_row(
        &self,
        file_name: &str,
        file_size: u64,
        package: &ParsedPackage,
        presence: &PresenceRecord,
    ) -> LedgerRow {
        LedgerRow {
            file_name: file_name.to_string(),
            package_name: package.package_name.clone(),
            google_play_link: presence
                .url_for(Catalog::GooglePlay)
                .unwrap_or_default()
                .to_string(),
            f_droid_link: presence
                .url_for(Catalog::FDroid)
                .unwrap_or_default()
                .to_string(),
            file_size_label: format_bytes(file_size),
            timestamp: format_timestamp(Utc::now(), self.tz),
        }
    }

    pub async fn append(&self, row: LedgerRow) -> LedgerStatus {
        let Some(store) = &self.store else {
            warn!("⚠️  Google Sheets credentials not set. Backup skipped.");
            return LedgerStatus::Skipped;
        };

        match self.write(store.as_ref(), row).await {
            Ok(()) => {
                info!("✅ Added to Google Sheet backup");
                LedgerStatus::Written
            }
            Err(e) => {
                error!("❌ Failed to add to Google Sheet: {}", e);
                LedgerStatus::Failed
            }
        }
    }

    async fn write(&self, store: &dyn LedgerStore, row: LedgerRow) -> Result<(), LedgerError> {
        self.ensure_header(store).await?;
        store.append_row(row.to_cells()).await
    }

    async fn ensure_header(&self, store: &dyn LedgerStore) -> Result<(), LedgerError> {
        if self.header_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        // Serializes the check within this process; the fixed-range write
        // keeps concurrent processes from producing two header rows.
        let _guard = self.header_lock.lock().await;
        if self.header_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        if store.header_row().await?.is_empty() {
            info!("📝 Empty sheet detected. Initializing headers...");
            store.write_header(&LEDGER_HEADER).await?;
        }

        self.header_ready.store(true, Ordering::Release);
        Ok(())
    }
}
