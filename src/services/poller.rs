use crate::infrastructure::telegram::BotApiClient;
use crate::models::IncomingUpload;
use crate::services::pipeline::Pipeline;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep, timeout};
use tokio_util::task::TaskTracker;

/// Longest a shutdown waits for uploads already being handled
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(300);

/// Long-polls `getUpdates` and hands every message to its own pipeline task
pub struct UpdatePoller {
    api: BotApiClient,
    pipeline: Arc<Pipeline>,
    poll_timeout_secs: u64,
    shutdown: watch::Receiver<bool>,
    in_flight: TaskTracker,
    drain_timeout: Duration,
}

impl UpdatePoller {
    pub fn new(
        api: BotApiClient,
        pipeline: Arc<Pipeline>,
        poll_timeout_secs: u64,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            api,
            pipeline,
            poll_timeout_secs,
            shutdown,
            in_flight: TaskTracker::new(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    /// Polls until shutdown is signalled, then waits for in-flight uploads so
    /// their placeholders get cleaned up and their reports posted.
    pub async fn run(mut self) {
        tracing::info!("🚀 Update poller started");
        let mut offset = 0;

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Update poller shutting down");
                    break;
                }
                result = self.api.get_updates(offset, self.poll_timeout_secs) => {
                    match result {
                        Ok(updates) => {
                            for update in updates {
                                offset = offset.max(update.update_id + 1);
                                if let Some(message) = update.into_message() {
                                    self.dispatch(IncomingUpload::from(message));
                                }
                            }
                        }
                        Err(e) => {
                            tracing::error!("Polling failed: {}", e);
                            sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }

        self.drain().await;
    }

    fn dispatch(&self, upload: IncomingUpload) {
        let pipeline = Arc::clone(&self.pipeline);
        self.in_flight.spawn(async move {
            let outcome = pipeline.handle(upload).await;
            tracing::debug!("Invocation finished: {:?}", outcome);
        });
    }

    async fn drain(&self) {
        self.in_flight.close();
        if self.in_flight.is_empty() {
            return;
        }

        tracing::info!(
            "⏳ Waiting for {} in-flight upload(s) to finish",
            self.in_flight.len()
        );
        if timeout(self.drain_timeout, self.in_flight.wait()).await.is_err() {
            tracing::warn!(
                "⚠️  {} upload(s) still running after {}s, abandoning them",
                self.in_flight.len(),
                self.drain_timeout.as_secs()
            );
        }
    }
}
