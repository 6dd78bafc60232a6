//! Log-channel mirroring
//!
//! Fire-and-forget copies of every upload (and the final batch summary)
//! to the configured log channels. Mirroring is strictly best-effort: a
//! channel that rejects a copy is remembered and skipped for the rest of
//! the run, and no mirror failure ever reaches the batch.

use crate::config::{BatchRequest, MirrorConfig};
use crate::error::UploadError;
use crate::types::{BatchSummary, DownloadItem};
use crate::upload::MessageHandle;
use crate::utils::format_duration;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Copies messages into a log channel
#[async_trait]
pub trait MirrorSink: Send + Sync {
    /// Forward an already-sent message into a channel, with a context note
    async fn forward(
        &self,
        channel: i64,
        handle: MessageHandle,
        note: &str,
    ) -> Result<(), UploadError>;

    /// Send a plain text message into a channel
    async fn send_text(&self, channel: i64, text: &str) -> Result<(), UploadError>;
}

/// Mirroring collaborator over all configured channels
pub struct LogMirror {
    config: MirrorConfig,
    sink: Arc<dyn MirrorSink>,
    failed_channels: Mutex<HashSet<i64>>,
}

impl LogMirror {
    /// Build a mirror over the configured channels
    pub fn new(config: MirrorConfig, sink: Arc<dyn MirrorSink>) -> Self {
        Self {
            config,
            sink,
            failed_channels: Mutex::new(HashSet::new()),
        }
    }

    /// Whether any channel is configured
    pub fn enabled(&self) -> bool {
        self.config.enabled()
    }

    /// Mirror one uploaded item to every live channel
    pub async fn mirror_upload(
        &self,
        handle: MessageHandle,
        item: &DownloadItem,
        request: &BatchRequest,
    ) {
        if !self.enabled() {
            return;
        }
        let note = format!(
            "#{:03} {} | batch: {} | source: {}",
            item.index.get(),
            item.display_name,
            request.batch_name,
            item.original_url(),
        );
        for channel in self.config.all_channels() {
            if self.is_failed(channel).await {
                continue;
            }
            if let Err(e) = self.sink.forward(channel, handle, &note).await {
                tracing::warn!(channel, error = %e, "mirror forward failed, skipping channel");
                self.mark_failed(channel).await;
            }
        }
    }

    /// Mirror the final batch summary as text to every live channel
    pub async fn mirror_batch_summary(&self, summary: &BatchSummary) {
        if !self.enabled() {
            return;
        }
        let text = summary_text(summary);
        for channel in self.config.all_channels() {
            if self.is_failed(channel).await {
                continue;
            }
            if let Err(e) = self.sink.send_text(channel, &text).await {
                tracing::warn!(channel, error = %e, "mirror summary failed, skipping channel");
                self.mark_failed(channel).await;
            }
        }
    }

    async fn is_failed(&self, channel: i64) -> bool {
        self.failed_channels.lock().await.contains(&channel)
    }

    async fn mark_failed(&self, channel: i64) {
        self.failed_channels.lock().await.insert(channel);
    }
}

fn summary_text(summary: &BatchSummary) -> String {
    format!(
        "Batch completed: {}\n\
         total: {} | downloaded: {} | uploaded: {} | failed: {}\n\
         success rate: {:.1}% | elapsed: {}",
        summary.batch_name,
        summary.stats.total,
        summary.stats.downloaded,
        summary.stats.uploaded,
        summary.stats.failed,
        summary.success_percent(),
        format_duration(summary.elapsed),
    )
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BatchStats, ItemIndex, RawEntry};
    use chrono::Utc;
    use std::time::Duration;

    struct RecordingSink {
        calls: Mutex<Vec<(i64, String)>>,
        fail_channel: Option<i64>,
    }

    impl RecordingSink {
        fn new(fail_channel: Option<i64>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                fail_channel,
            })
        }
    }

    #[async_trait]
    impl MirrorSink for RecordingSink {
        async fn forward(
            &self,
            channel: i64,
            _handle: MessageHandle,
            note: &str,
        ) -> Result<(), UploadError> {
            if self.fail_channel == Some(channel) {
                return Err(UploadError::Rejected {
                    name: "copy".to_string(),
                    reason: "chat not found".to_string(),
                });
            }
            self.calls.lock().await.push((channel, note.to_string()));
            Ok(())
        }

        async fn send_text(&self, channel: i64, text: &str) -> Result<(), UploadError> {
            if self.fail_channel == Some(channel) {
                return Err(UploadError::Rejected {
                    name: "text".to_string(),
                    reason: "chat not found".to_string(),
                });
            }
            self.calls.lock().await.push((channel, text.to_string()));
            Ok(())
        }
    }

    fn test_item() -> DownloadItem {
        DownloadItem::new(
            ItemIndex::new(2),
            RawEntry {
                label: "Lesson".to_string(),
                url_suffix: "example.com/v.mp4".to_string(),
            },
            "Lesson".to_string(),
        )
    }

    fn test_summary() -> BatchSummary {
        BatchSummary {
            batch_name: "Physics".to_string(),
            stats: BatchStats {
                total: 4,
                downloaded: 3,
                uploaded: 3,
                failed: 1,
                ..Default::default()
            },
            elapsed: Duration::from_secs(125),
            completed_at: Utc::now(),
        }
    }

    fn handle() -> MessageHandle {
        MessageHandle {
            chat_id: 1,
            message_id: 10,
        }
    }

    #[tokio::test]
    async fn mirrors_to_primary_and_backup_channels() {
        let sink = RecordingSink::new(None);
        let mirror = LogMirror::new(
            MirrorConfig {
                log_channels: vec![-100],
                backup_log_channels: vec![-200],
            },
            sink.clone(),
        );

        mirror
            .mirror_upload(handle(), &test_item(), &BatchRequest::default())
            .await;

        let calls = sink.calls.lock().await;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, -100);
        assert_eq!(calls[1].0, -200);
        assert!(calls[0].1.contains("#002 Lesson"));
    }

    #[tokio::test]
    async fn failed_channel_is_skipped_afterwards() {
        let sink = RecordingSink::new(Some(-100));
        let mirror = LogMirror::new(
            MirrorConfig {
                log_channels: vec![-100, -200],
                backup_log_channels: vec![],
            },
            sink.clone(),
        );

        mirror
            .mirror_upload(handle(), &test_item(), &BatchRequest::default())
            .await;
        mirror.mirror_batch_summary(&test_summary()).await;

        let calls = sink.calls.lock().await;
        // -100 failed on the first round and was skipped on the second
        assert_eq!(calls.iter().filter(|(c, _)| *c == -100).count(), 0);
        assert_eq!(calls.iter().filter(|(c, _)| *c == -200).count(), 2);
    }

    #[tokio::test]
    async fn disabled_mirror_sends_nothing() {
        let sink = RecordingSink::new(None);
        let mirror = LogMirror::new(MirrorConfig::default(), sink.clone());
        assert!(!mirror.enabled());

        mirror
            .mirror_upload(handle(), &test_item(), &BatchRequest::default())
            .await;
        mirror.mirror_batch_summary(&test_summary()).await;

        assert!(sink.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn summary_text_reports_totals() {
        let sink = RecordingSink::new(None);
        let mirror = LogMirror::new(
            MirrorConfig {
                log_channels: vec![-100],
                backup_log_channels: vec![],
            },
            sink.clone(),
        );

        mirror.mirror_batch_summary(&test_summary()).await;

        let calls = sink.calls.lock().await;
        let text = &calls[0].1;
        assert!(text.contains("Physics"));
        assert!(text.contains("total: 4"));
        assert!(text.contains("failed: 1"));
        assert!(text.contains("75.0%"));
        assert!(text.contains("2m 5s"));
    }
}
