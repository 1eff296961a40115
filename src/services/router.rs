use crate::error::{NotApplicable, RetrievalError};
use crate::infrastructure::telegram::Messenger;
use crate::infrastructure::transfer::TransferHandle;
use crate::models::{DocumentMeta, FileLocation, IncomingUpload, RetrievedFile};
use crate::utils::validation::ArchiveKind;
use std::sync::Arc;
use tracing::{debug, info};

/// How an upload's bytes are obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Bot API `getFile` URL, valid for a short while
    ShortLivedUrl,
    /// Whole payload through the bulk-transfer client
    BulkTransfer,
}

/// Picks a retrieval strategy by declared size and runs it
pub struct RetrievalRouter {
    threshold: u64,
    messenger: Arc<dyn Messenger>,
    transfer: TransferHandle,
}

impl RetrievalRouter {
    pub fn new(threshold: u64, messenger: Arc<dyn Messenger>, transfer: TransferHandle) -> Self {
        Self {
            threshold,
            messenger,
            transfer,
        }
    }

    /// Rejects non-documents and non-archive names before any work is done
    pub fn classify<'a>(
        &self,
        upload: &'a IncomingUpload,
    ) -> Result<(&'a DocumentMeta, ArchiveKind), NotApplicable> {
        let document = upload.document.as_ref().ok_or(NotApplicable::NoDocument)?;
        let kind = ArchiveKind::from_file_name(&document.file_name)
            .ok_or_else(|| NotApplicable::UnsupportedExtension(document.file_name.clone()))?;
        Ok((document, kind))
    }

    pub fn strategy_for(&self, declared_size: u64) -> Strategy {
        if declared_size <= self.threshold {
            Strategy::ShortLivedUrl
        } else {
            Strategy::BulkTransfer
        }
    }

    pub async fn retrieve(
        &self,
        upload: &IncomingUpload,
        document: &DocumentMeta,
    ) -> Result<RetrievedFile, RetrievalError> {
        let strategy = self.strategy_for(document.file_size);
        let size_mb = document.file_size as f64 / 1024.0 / 1024.0;

        let location = match strategy {
            Strategy::ShortLivedUrl => {
                debug!("📥 Using Bot API for file ({:.2}MB)", size_mb);
                let url = self.messenger.file_download_url(&document.file_id).await?;
                FileLocation::Url(url)
            }
            Strategy::BulkTransfer => {
                info!("📥 Using bulk transfer for large file ({:.2}MB)", size_mb);
                FileLocation::Buffer(self.fetch_bulk(upload).await?)
            }
        };

        Ok(RetrievedFile {
            file_name: document.file_name.clone(),
            file_size: document.file_size,
            mime_type: document.mime_type.clone(),
            location,
        })
    }

    async fn fetch_bulk(&self, upload: &IncomingUpload) -> Result<bytes::Bytes, RetrievalError> {
        // Re-read per call: the client may have come up after this router was built
        let transfer = self
            .transfer
            .current()
            .ok_or(RetrievalError::TransferUnavailable)?;

        let media = transfer
            .fetch_message(upload)
            .await?
            .ok_or(RetrievalError::MediaNotFound {
                chat_id: upload.chat.id,
                message_id: upload.message_id,
            })?;

        let buffer = transfer.download_media(&media).await?;
        if buffer.is_empty() {
            return Err(RetrievalError::EmptyPayload);
        }

        info!(
            "✅ Downloaded {:.2}MB via bulk transfer",
            buffer.len() as f64 / 1024.0 / 1024.0
        );
        Ok(buffer)
    }
}
