//! End-to-end batch pipeline tests through the public API

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use batch_dl::{
    BatchPipeline, BatchRequest, ChatTarget, Config, FetchError, FetchPlan, Fetcher, LogMirror,
    MessageHandle, MirrorConfig, MirrorSink, Notifier, RetryConfig, Store, UploadError,
    UploadPayload, Uploader,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Fetcher that writes real artifacts into the download directory
struct DiskFetcher {
    calls: Mutex<HashMap<String, u32>>,
    fail_substring: Option<String>,
}

impl DiskFetcher {
    fn new(fail_substring: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(HashMap::new()),
            fail_substring: fail_substring.map(str::to_string),
        })
    }
}

#[async_trait]
impl Fetcher for DiskFetcher {
    async fn fetch(&self, plan: &FetchPlan) -> Result<PathBuf, FetchError> {
        *self
            .calls
            .lock()
            .await
            .entry(plan.url.clone())
            .or_insert(0) += 1;

        if let Some(s) = &self.fail_substring {
            if plan.url.contains(s) {
                return Err(FetchError::ToolFailed {
                    status: 1,
                    stderr: "simulated".to_string(),
                });
            }
        }

        let output = plan.output.clone().expect("non-zip plans carry an output");
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&output, b"artifact").await?;
        Ok(output)
    }
}

struct RecordingUploader {
    captions: Mutex<Vec<String>>,
    payloads: Mutex<Vec<UploadPayload>>,
}

impl RecordingUploader {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            captions: Mutex::new(Vec::new()),
            payloads: Mutex::new(Vec::new()),
        })
    }

    async fn upload_order(&self) -> Vec<u32> {
        self.captions
            .lock()
            .await
            .iter()
            .map(|c| c[1..4].parse().unwrap())
            .collect()
    }
}

#[async_trait]
impl Uploader for RecordingUploader {
    async fn upload(
        &self,
        _target: ChatTarget,
        payload: UploadPayload,
        caption: &str,
    ) -> Result<MessageHandle, UploadError> {
        let id = self.captions.lock().await.len() as i64;
        self.captions.lock().await.push(caption.to_string());
        self.payloads.lock().await.push(payload);
        Ok(MessageHandle {
            chat_id: 9,
            message_id: id,
        })
    }
}

struct SilentNotifier;

#[async_trait]
impl Notifier for SilentNotifier {
    async fn notify(&self, _text: &str) {}
}

struct RecordingSink {
    forwards: Mutex<Vec<(i64, String)>>,
    texts: Mutex<Vec<(i64, String)>>,
}

impl RecordingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            forwards: Mutex::new(Vec::new()),
            texts: Mutex::new(Vec::new()),
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
        self.forwards.lock().await.push((channel, note.to_string()));
        Ok(())
    }

    async fn send_text(&self, channel: i64, text: &str) -> Result<(), UploadError> {
        self.texts.lock().await.push((channel, text.to_string()));
        Ok(())
    }
}

fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = dir.to_path_buf();
    config.retry = RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config
}

fn request() -> BatchRequest {
    BatchRequest {
        batch_name: "Integration".to_string(),
        credit: "Team".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn mixed_batch_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = DiskFetcher::new(Some("broken"));
    let uploader = RecordingUploader::new();
    let sink = RecordingSink::new();
    let mirror = Arc::new(LogMirror::new(
        MirrorConfig {
            log_channels: vec![-500],
            backup_log_channels: vec![],
        },
        sink.clone(),
    ));
    let store = Store::open(&dir.path().join("history.db")).await.unwrap();

    let pipeline = BatchPipeline::new(
        test_config(dir.path()),
        fetcher.clone(),
        uploader.clone(),
        Arc::new(SilentNotifier),
        42,
    )
    .with_mirror(mirror)
    .with_store(store.clone());

    let lines = "\
        Lecture One://cdn.example.com/v1.mp4\n\
        Notes://files.example.com/notes.pdf\n\
        Broken://cdn.example.com/broken.mp4\n\
        Archive://files.example.com/bundle.zip\n\
        Lecture Two://cdn.example.com/v2.mp4\n";
    let summary = pipeline.run_batch(lines, &request()).await.unwrap();

    // Item 3 fails; everything else settles and uploads in order
    assert_eq!(summary.stats.total, 5);
    assert_eq!(summary.stats.downloaded, 4);
    assert_eq!(summary.stats.failed, 1);
    assert_eq!(summary.stats.uploaded, 4);
    assert_eq!(uploader.upload_order().await, vec![1, 2, 4, 5]);

    // Failed item consumed its full attempt budget
    let calls = fetcher.calls.lock().await;
    let broken_calls: u32 = calls
        .iter()
        .filter(|(url, _)| url.contains("broken"))
        .map(|(_, n)| *n)
        .sum();
    assert_eq!(broken_calls, 2);
    drop(calls);

    // Uploaded artifacts were deleted after sending
    let leftover: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".mp4") || n.ends_with(".pdf"))
        .collect();
    assert!(leftover.is_empty(), "artifacts remained: {leftover:?}");

    // Payload forms follow content kinds
    let payloads = uploader.payloads.lock().await;
    assert!(matches!(payloads[0], UploadPayload::Video { .. }));
    assert!(matches!(payloads[1], UploadPayload::Document { .. }));
    assert!(matches!(payloads[2], UploadPayload::LinkButton { .. }));
    assert!(matches!(payloads[3], UploadPayload::Video { .. }));
    drop(payloads);

    // Each upload was mirrored, plus one summary text
    assert_eq!(sink.forwards.lock().await.len(), 4);
    let texts = sink.texts.lock().await;
    assert_eq!(texts.len(), 1);
    assert!(texts[0].1.contains("total: 5"));
    drop(texts);

    // History recorded every terminal item
    let rows = store.recent_history(10).await.unwrap();
    assert_eq!(rows.len(), 5);
    assert_eq!(rows.iter().filter(|r| r.status == "uploaded").count(), 4);
    assert_eq!(rows.iter().filter(|r| r.status == "failed").count(), 1);
}

#[tokio::test]
async fn batch_with_only_failures_still_summarizes() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = DiskFetcher::new(Some("cdn"));
    let uploader = RecordingUploader::new();

    let pipeline = BatchPipeline::new(
        test_config(dir.path()),
        fetcher,
        uploader.clone(),
        Arc::new(SilentNotifier),
        42,
    );

    let summary = pipeline
        .run_batch(
            "a://cdn.example.com/1.mp4\nb://cdn.example.com/2.mp4\n",
            &request(),
        )
        .await
        .unwrap();

    assert_eq!(summary.stats.failed, 2);
    assert_eq!(summary.stats.downloaded, 0);
    assert_eq!(summary.stats.uploaded, 0);
    assert!(uploader.upload_order().await.is_empty());
    assert_eq!(summary.success_percent(), 0.0);
}

#[tokio::test]
async fn concurrency_is_bounded_by_config() {
    use std::sync::atomic::{AtomicU32, Ordering};

    struct GaugeFetcher {
        active: AtomicU32,
        peak: AtomicU32,
    }

    #[async_trait]
    impl Fetcher for GaugeFetcher {
        async fn fetch(&self, plan: &FetchPlan) -> Result<PathBuf, FetchError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(plan.output.clone().unwrap_or_else(|| PathBuf::from("/tmp/x")))
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.download.max_concurrent_downloads = 3;

    let fetcher = Arc::new(GaugeFetcher {
        active: AtomicU32::new(0),
        peak: AtomicU32::new(0),
    });
    let uploader = RecordingUploader::new();
    let pipeline = BatchPipeline::new(
        config,
        fetcher.clone(),
        uploader.clone(),
        Arc::new(SilentNotifier),
        42,
    );

    let lines: String = (1..=9)
        .map(|i| format!("item {i}://cdn.example.com/f{i}.mp4\n"))
        .collect();
    let summary = pipeline.run_batch(&lines, &request()).await.unwrap();

    assert_eq!(summary.stats.uploaded, 9);
    assert!(fetcher.peak.load(Ordering::SeqCst) <= 3);
    assert_eq!(uploader.upload_order().await, (1..=9).collect::<Vec<_>>());
}
