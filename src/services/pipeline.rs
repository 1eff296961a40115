use crate::error::{AnalysisError, NotApplicable};
use crate::infrastructure::telegram::SendOptions;
use crate::models::{Chat, ChatId, DocumentMeta, IncomingUpload, ParsedPackage, PresenceRecord};
use crate::services::extractor::ArchiveExtractor;
use crate::services::ledger::{LedgerStatus, LedgerWriter};
use crate::services::marketplace::PresenceResolver;
use crate::services::notifier::{
    ANALYZING, GENERIC_FAILURE, MISSING_PACKAGE, NOT_AN_APP, Notifier, SuccessReport,
    check_analysis_reply, error_message, message_link, success_message, unsupported_message,
};
use crate::services::router::RetrievalRouter;
use crate::utils::validation::ArchiveKind;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

/// Terminal state of one invocation
#[derive(Debug)]
pub enum Outcome {
    /// Not a candidate; only the temporary notice was posted
    NotApplicable(NotApplicable),
    /// `.apks` bundle, reported without retrieval
    Unsupported,
    Success {
        package: ParsedPackage,
        presence: PresenceRecord,
        ledger: LedgerStatus,
        report_posted: bool,
    },
    Failed {
        missing_package: bool,
    },
}

/// Ingestion and enrichment of one uploaded archive
pub struct Pipeline {
    router: RetrievalRouter,
    extractor: ArchiveExtractor,
    resolver: PresenceResolver,
    ledger: LedgerWriter,
    notifier: Notifier,
    result_chat: ChatId,
    notice_ttl: Duration,
}

impl Pipeline {
    pub fn new(
        router: RetrievalRouter,
        extractor: ArchiveExtractor,
        resolver: PresenceResolver,
        ledger: LedgerWriter,
        notifier: Notifier,
        result_chat: ChatId,
        notice_ttl: Duration,
    ) -> Self {
        Self {
            router,
            extractor,
            resolver,
            ledger,
            notifier,
            result_chat,
            notice_ttl,
        }
    }

    pub async fn handle(self: Arc<Self>, upload: IncomingUpload) -> Outcome {
        let span = info_span!(
            "upload",
            invocation_id = %Uuid::new_v4(),
            chat_id = upload.chat.id,
            message_id = upload.message_id,
        );
        self.run(upload).instrument(span).await
    }

    async fn run(self: Arc<Self>, upload: IncomingUpload) -> Outcome {
        let source = ChatId::from(upload.chat.id);

        let (document, kind) = match self.router.classify(&upload) {
            Ok((document, kind)) => (document.clone(), kind),
            Err(reason) => {
                debug!("Skipping upload: {}", reason);
                self.notifier
                    .send_temporary(&source, NOT_AN_APP, self.notice_ttl)
                    .await;
                return Outcome::NotApplicable(reason);
            }
        };

        info!("📥 Received {} ({} bytes)", document.file_name, document.file_size);

        let placeholder = self
            .notifier
            .send(
                &source,
                ANALYZING,
                SendOptions {
                    disable_web_page_preview: true,
                    ..SendOptions::default()
                },
            )
            .await;

        let outcome = match kind {
            ArchiveKind::Bundle => {
                info!("📦 Bundle upload, reporting as unsupported");
                let text = unsupported_message(&upload.chat, upload.message_id, &document.file_name);
                self.notifier
                    .send(&self.result_chat, &text, SendOptions::default())
                    .await;
                Outcome::Unsupported
            }
            ArchiveKind::Apk => Arc::clone(&self).analyze_guarded(upload, document).await,
        };

        if let Some(placeholder) = placeholder {
            self.notifier
                .delete_quiet(&source, placeholder.message_id)
                .await;
        }

        outcome
    }

    /// Runs the analysis on its own task so a panic still ends in an Error
    /// report and the placeholder cleanup in `run`.
    async fn analyze_guarded(self: Arc<Self>, upload: IncomingUpload, document: DocumentMeta) -> Outcome {
        let chat = upload.chat.clone();
        let message_id = upload.message_id;

        let worker = Arc::clone(&self);
        let task = tokio::spawn(
            async move { worker.analyze(&upload, &document).await }.in_current_span(),
        );

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                let err = AnalysisError::Aborted(e.to_string());
                error!("❌ Analyzer error: {}", err);
                self.report_failure(&chat, message_id, &err).await;
                Outcome::Failed {
                    missing_package: false,
                }
            }
        }
    }

    async fn analyze(&self, upload: &IncomingUpload, document: &DocumentMeta) -> Outcome {
        let (package, direct_url) = match self.retrieve_and_extract(upload, document).await {
            Ok(parsed) => parsed,
            Err(e) => {
                error!("❌ Analyzer error: {}", e);
                self.report_failure(&upload.chat, upload.message_id, &e).await;
                return Outcome::Failed {
                    missing_package: e.is_missing_package(),
                };
            }
        };

        let presence = self.resolver.resolve(&package.package_name).await;
        info!(
            "🔎 {} store link(s) found for {}",
            presence.links.len(),
            package.package_name
        );

        let row = self
            .ledger
            .build_row(&document.file_name, document.file_size, &package, &presence);
        let ledger = self.ledger.append(row).await;

        let text = success_message(&SuccessReport {
            chat: &upload.chat,
            message_id: upload.message_id,
            file_name: &document.file_name,
            file_size: document.file_size,
            package: &package,
            presence: &presence,
            direct_url: direct_url.as_deref(),
        });

        let report = self
            .notifier
            .send(&self.result_chat, &text, SendOptions::default())
            .await;
        let report_posted = report.is_some();

        if let Some(link) = report.and_then(|r| message_link(&r.chat, r.message_id)) {
            self.notifier
                .send(
                    &ChatId::from(upload.chat.id),
                    &check_analysis_reply(&link),
                    SendOptions {
                        reply_to_message_id: Some(upload.message_id),
                        ..SendOptions::default()
                    },
                )
                .await;
        }

        info!("✅ Analysis complete for {}", package.package_name);
        Outcome::Success {
            package,
            presence,
            ledger,
            report_posted,
        }
    }

    /// Direct URL is kept only for the short-lived strategy; the archive itself
    /// is dropped as soon as the manifest has been read.
    async fn retrieve_and_extract(
        &self,
        upload: &IncomingUpload,
        document: &DocumentMeta,
    ) -> Result<(ParsedPackage, Option<String>), AnalysisError> {
        let file = self.router.retrieve(upload, document).await?;
        let package = self.extractor.extract(&file).await?;
        Ok((package, file.direct_url().map(str::to_string)))
    }

    async fn report_failure(&self, chat: &Chat, message_id: i64, err: &AnalysisError) {
        let summary = if err.is_missing_package() {
            MISSING_PACKAGE
        } else {
            GENERIC_FAILURE
        };

        self.notifier
            .send(
                &self.result_chat,
                &error_message(chat, message_id, summary),
                SendOptions::default(),
            )
            .await;
    }
}
