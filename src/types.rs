//! Core types for batch-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// 1-based position of an item in the original input list
///
/// Defines the strict upload order; immutable once assigned.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ItemIndex(pub u32);

impl ItemIndex {
    /// Create a new ItemIndex
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the inner u32 value
    pub fn get(&self) -> u32 {
        self.0
    }

    /// The index that follows this one
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl From<u32> for ItemIndex {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

impl From<ItemIndex> for u32 {
    fn from(index: ItemIndex) -> Self {
        index.0
    }
}

impl std::fmt::Display for ItemIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One parsed input line: an optional label and the URL suffix
///
/// Input lines are either `label://url-without-scheme` or a bare
/// `scheme://url`; in the bare form the scheme becomes the label.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntry {
    /// Text before the `://` separator (a title, or a bare scheme)
    pub label: String,
    /// Text after the separator, without a scheme
    pub url_suffix: String,
}

impl RawEntry {
    /// The fetchable https form of this entry
    pub fn https_url(&self) -> String {
        format!("https://{}", self.url_suffix)
    }
}

/// Lifecycle state of a batch item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Waiting in the pending queue
    Pending,
    /// A worker is fetching it
    Downloading,
    /// Artifact on disk, waiting for its turn to upload
    Downloaded,
    /// The sequencer is sending it
    Uploading,
    /// Sent and local artifact removed (terminal)
    Uploaded,
    /// Download failed permanently (terminal)
    Failed,
    /// Upload rejected; not retried (terminal)
    UploadFailed,
}

impl ItemState {
    /// Whether the item has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemState::Uploaded | ItemState::Failed | ItemState::UploadFailed
        )
    }
}

/// Detected content category of an item
///
/// Drives both the fetch strategy and the upload form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Generic video (default)
    Video,
    /// PDF document
    Pdf,
    /// Still image (.jpg/.jpeg/.png)
    Image,
    /// Audio file (.mp3/.wav/.m4a)
    Audio,
    /// Rendered HTML page (.ws routes)
    Html,
    /// Archive delivered as a link button, never fetched
    ZipLink,
    /// Cloud-drive document of unknown type
    Document,
    /// Stream with an inline decryption key
    EncryptedStream,
    /// DRM manifest requiring external key resolution
    DrmStream,
    /// HLS playlist
    Hls,
}

impl ContentKind {
    /// Extension tag used in captions
    pub fn caption_ext(&self) -> &'static str {
        match self {
            ContentKind::Pdf => ".pdf",
            ContentKind::Image => ".jpg",
            ContentKind::Audio => ".mp3",
            ContentKind::Html => ".html",
            ContentKind::ZipLink => ".zip",
            ContentKind::Document => ".bin",
            _ => ".mkv",
        }
    }
}

/// Source platform classification of a URL
///
/// Each URL is classified exactly once; the transformer and the strategy
/// selector dispatch on the variant instead of re-testing substrings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Embed-player host whose page must be scraped for a manifest URL
    EmbedPlayer,
    /// DRM CDN host needing host/path substitution plus proxy or signing
    DrmCdn,
    /// CDN host whose URLs are exchanged at a signing endpoint
    SignedCdn,
    /// Encrypted-player portal routed through an unscrambling proxy
    PortalPlayer,
    /// Cloud-drive share link
    CloudDrive,
    /// Native video host (cookie-authenticated fetch)
    VideoHost,
    /// Anything else
    Generic,
}

/// One URL entry tracked end-to-end through the pipeline
///
/// Exactly one task owns an item at a time: the worker that popped it
/// until it reaches `Downloaded`, then the sequencer until terminal.
#[derive(Clone, Debug)]
pub struct DownloadItem {
    /// Position in the original list; defines upload order
    pub index: ItemIndex,
    /// The original input entry
    pub raw: RawEntry,
    /// URL after transformation; set once during processing
    pub resolved_url: String,
    /// Short label used for captions and filenames
    pub display_name: String,
    /// Filesystem location of the artifact; set on success
    pub local_path: Option<PathBuf>,
    /// Lifecycle state
    pub state: ItemState,
    /// Detected content category
    pub content: ContentKind,
    /// Detected source platform
    pub source: SourceKind,
    /// Number of retries the fetch needed
    pub retry_count: u32,
    /// Message from the most recent failure
    pub last_error: Option<String>,
}

impl DownloadItem {
    /// Create a pending item from a parsed entry
    pub fn new(index: ItemIndex, raw: RawEntry, display_name: String) -> Self {
        let resolved_url = raw.https_url();
        Self {
            index,
            raw,
            resolved_url,
            display_name,
            local_path: None,
            state: ItemState::Pending,
            content: ContentKind::Video,
            source: SourceKind::Generic,
            retry_count: 0,
            last_error: None,
        }
    }

    /// The original URL, for captions and failure reports
    pub fn original_url(&self) -> String {
        self.raw.https_url()
    }
}

/// Aggregate statistics for one batch run
///
/// Mutated under a single mutex by workers and the sequencer. Invariants:
/// `downloaded + failed <= total` at all times, `uploaded <= downloaded`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BatchStats {
    /// Items in this run (from start_index to end of list)
    pub total: u32,
    /// Items that reached `Downloaded`
    pub downloaded: u32,
    /// Items that reached `Uploaded`
    pub uploaded: u32,
    /// Items that failed permanently during download
    pub failed: u32,
    /// Fetches currently in flight
    pub active_downloads: u32,
    /// Per-category breakdown
    pub by_content: HashMap<ContentKind, u32>,
    /// Per-platform breakdown
    pub by_source: HashMap<SourceKind, u32>,
}

impl BatchStats {
    /// Items that have reached a terminal download state
    pub fn settled(&self) -> u32 {
        self.downloaded + self.failed
    }

    /// Fraction of items downloaded successfully, 0.0 when empty
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.downloaded) / f64::from(self.total)
        }
    }
}

/// Final snapshot emitted when a batch completes
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Batch label from the request
    pub batch_name: String,
    /// Final statistics
    pub stats: BatchStats,
    /// Wall-clock duration of the run
    #[serde(with = "secs_serde")]
    pub elapsed: Duration,
    /// Completion timestamp
    pub completed_at: DateTime<Utc>,
}

impl BatchSummary {
    /// Success rate as a percentage
    pub fn success_percent(&self) -> f64 {
        self.stats.success_rate() * 100.0
    }
}

/// Events broadcast during a batch run
///
/// Consumers subscribe through [`BatchPipeline::subscribe`] to drive
/// progress surfaces; no polling required.
///
/// [`BatchPipeline::subscribe`]: crate::pipeline::BatchPipeline::subscribe
#[derive(Clone, Debug)]
pub enum Event {
    /// A worker started fetching an item
    ItemStarted {
        /// Item position
        index: ItemIndex,
        /// Display name
        name: String,
    },
    /// An item's artifact landed on disk
    ItemDownloaded {
        /// Item position
        index: ItemIndex,
        /// Retries the fetch needed
        retries: u32,
    },
    /// An item failed permanently during download
    ItemFailed {
        /// Item position
        index: ItemIndex,
        /// Failure description
        error: String,
    },
    /// The sequencer finished sending an item
    ItemUploaded {
        /// Item position
        index: ItemIndex,
    },
    /// The endpoint rejected an item's upload
    ItemUploadFailed {
        /// Item position
        index: ItemIndex,
        /// Rejection description
        error: String,
    },
    /// Progress snapshot, emitted on every item completion
    Progress {
        /// Items settled so far (downloaded + failed)
        done: u32,
        /// Total items in the run
        total: u32,
        /// `done / total` as a percentage
        percent: f64,
        /// Time since the batch started
        elapsed: Duration,
    },
    /// The batch finished
    BatchCompleted(BatchSummary),
}

/// Serialize Duration as f64 seconds inside summaries
mod secs_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_index_ordering_and_display() {
        let a = ItemIndex::new(1);
        let b = ItemIndex::new(2);
        assert!(a < b);
        assert_eq!(a.next(), b);
        assert_eq!(b.to_string(), "2");
    }

    #[test]
    fn raw_entry_https_url() {
        let entry = RawEntry {
            label: "Lecture 01".to_string(),
            url_suffix: "example.com/v/1.mp4".to_string(),
        };
        assert_eq!(entry.https_url(), "https://example.com/v/1.mp4");
    }

    #[test]
    fn terminal_states() {
        assert!(ItemState::Uploaded.is_terminal());
        assert!(ItemState::Failed.is_terminal());
        assert!(ItemState::UploadFailed.is_terminal());
        assert!(!ItemState::Downloaded.is_terminal());
        assert!(!ItemState::Pending.is_terminal());
    }

    #[test]
    fn stats_success_rate() {
        let mut stats = BatchStats {
            total: 5,
            downloaded: 4,
            failed: 1,
            uploaded: 4,
            ..Default::default()
        };
        assert_eq!(stats.settled(), 5);
        assert!((stats.success_rate() - 0.8).abs() < f64::EPSILON);

        stats.total = 0;
        assert_eq!(stats.success_rate(), 0.0);
    }

    #[test]
    fn new_item_starts_pending() {
        let item = DownloadItem::new(
            ItemIndex::new(3),
            RawEntry {
                label: "x".to_string(),
                url_suffix: "example.com/a.pdf".to_string(),
            },
            "x".to_string(),
        );
        assert_eq!(item.state, ItemState::Pending);
        assert_eq!(item.retry_count, 0);
        assert!(item.local_path.is_none());
        assert_eq!(item.resolved_url, "https://example.com/a.pdf");
    }

    #[test]
    fn summary_serializes() {
        let summary = BatchSummary {
            batch_name: "b".to_string(),
            stats: BatchStats {
                total: 2,
                downloaded: 2,
                uploaded: 2,
                ..Default::default()
            },
            elapsed: Duration::from_secs(90),
            completed_at: Utc::now(),
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"total\":2"));
        assert!((summary.success_percent() - 100.0).abs() < f64::EPSILON);
    }
}
