//! Configuration types for batch-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Download behavior configuration (directories, concurrency, timeouts)
///
/// Groups settings related to how batch items are fetched and stored.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Download directory (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Maximum concurrent downloads (default: 5)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Overall timeout for a single fetch invocation (default: 1 hour)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    pub fetch_timeout: Duration,

    /// Timeout for URL transformation network calls (default: 30 seconds)
    #[serde(default = "default_transform_timeout", with = "duration_serde")]
    pub transform_timeout: Duration,

    /// Timeout for each interactive configuration step (default: 5 minutes)
    #[serde(default = "default_listen_timeout", with = "duration_serde")]
    pub listen_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            fetch_timeout: default_fetch_timeout(),
            transform_timeout: default_transform_timeout(),
            listen_timeout: default_listen_timeout(),
        }
    }
}

/// Retry behavior for fetch operations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per item (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false; batch workers are few
    /// enough that thundering herd is not a concern)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Access tokens and fixed service endpoints consumed by the URL transformer
///
/// Endpoint bases are configurable so deployments can point at their own
/// proxy instances; defaults match the public gateways.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Bearer token for the CDN signing endpoint
    #[serde(default)]
    pub signing_token: Option<String>,

    /// Default access token for portal-player URLs (overridable per batch)
    #[serde(default)]
    pub portal_token: Option<String>,

    /// Authorization token for the HTML render gateway
    #[serde(default)]
    pub render_token: Option<String>,

    /// CDN signing endpoint (returns a signed playable URL as JSON)
    #[serde(default = "default_signing_endpoint")]
    pub signing_endpoint: String,

    /// Proxy-rewriting endpoint for DRM-CDN URLs
    #[serde(default = "default_drm_proxy")]
    pub drm_proxy: String,

    /// Unscrambling proxy for portal-player URLs
    #[serde(default = "default_portal_proxy")]
    pub portal_proxy: String,

    /// Secondary unscrambling proxy for legacy portal URLs
    #[serde(default = "default_portal_proxy_legacy")]
    pub portal_proxy_legacy: String,

    /// Conversion gateway for wildcard `.pdf*` URLs
    #[serde(default = "default_pdf_gateway")]
    pub pdf_gateway: String,

    /// Conversion gateway for `.zip` URLs
    #[serde(default = "default_zip_gateway")]
    pub zip_gateway: String,

    /// HTML rendering gateway for `.ws` URLs
    #[serde(default = "default_render_gateway")]
    pub render_gateway: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            signing_token: None,
            portal_token: None,
            render_token: None,
            signing_endpoint: default_signing_endpoint(),
            drm_proxy: default_drm_proxy(),
            portal_proxy: default_portal_proxy(),
            portal_proxy_legacy: default_portal_proxy_legacy(),
            pdf_gateway: default_pdf_gateway(),
            zip_gateway: default_zip_gateway(),
            render_gateway: default_render_gateway(),
        }
    }
}

/// External tool paths
///
/// The fetch tool is a yt-dlp-compatible downloader; the merge tool
/// decrypts and muxes DRM streams. Both are auto-detected from PATH when
/// not set explicitly.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the fetch tool executable (auto-detected if None)
    #[serde(default)]
    pub fetch_tool_path: Option<PathBuf>,

    /// Path to the DRM decrypt-and-merge tool (auto-detected if None)
    #[serde(default)]
    pub merge_tool_path: Option<PathBuf>,

    /// Cookie file passed to the fetch tool for video-host URLs
    #[serde(default)]
    pub cookies_file: Option<PathBuf>,

    /// Whether to search PATH for tools when explicit paths are not set
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            fetch_tool_path: None,
            merge_tool_path: None,
            cookies_file: None,
            search_path: true,
        }
    }
}

/// Log-channel mirroring configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Primary log channel ids
    #[serde(default)]
    pub log_channels: Vec<i64>,

    /// Backup log channel ids (receive the same copies)
    #[serde(default)]
    pub backup_log_channels: Vec<i64>,
}

impl MirrorConfig {
    /// All configured channels, primary first
    pub fn all_channels(&self) -> Vec<i64> {
        self.log_channels
            .iter()
            .chain(self.backup_log_channels.iter())
            .copied()
            .collect()
    }

    /// Mirroring is enabled when at least one channel is configured
    pub fn enabled(&self) -> bool {
        !self.log_channels.is_empty() || !self.backup_log_channels.is_empty()
    }
}

/// Persistence configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database path (default: "./batch-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration for the batch pipeline
///
/// Fields are organized into logical sub-configs:
/// - [`download`](DownloadConfig) — directories, concurrency, timeouts
/// - [`retry`](RetryConfig) — fetch retry behavior
/// - [`tokens`](TokenConfig) — transformer tokens and endpoint bases
/// - [`tools`](ToolsConfig) — external binary paths
/// - [`mirror`](MirrorConfig) — log channel ids
///
/// Sub-config fields are flattened for serialization, so the JSON/TOML
/// format stays flat (no nesting).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// Retry behavior for fetch operations
    #[serde(default)]
    pub retry: RetryConfig,

    /// Transformer tokens and endpoint bases
    #[serde(flatten)]
    pub tokens: TokenConfig,

    /// External tool paths
    #[serde(flatten)]
    pub tools: ToolsConfig,

    /// Log-channel mirroring
    #[serde(flatten)]
    pub mirror: MirrorConfig,

    /// Data storage
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

// Convenience accessors — keep call sites short without reaching through
// the sub-config structs.
impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Concurrency limit for the worker pool
    pub fn max_concurrent_downloads(&self) -> usize {
        self.download.max_concurrent_downloads
    }
}

/// One structured request describing a batch run
///
/// Replaces the original staged per-chat prompt sequence: all fields
/// arrive together and are validated once before any work starts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchRequest {
    /// Human-readable batch label used in captions and summaries
    pub batch_name: String,

    /// Target quality as a bare height, e.g. "720"
    #[serde(default = "default_quality")]
    pub quality: String,

    /// Credit string stamped into captions
    #[serde(default)]
    pub credit: String,

    /// Per-batch portal token override
    #[serde(default)]
    pub portal_token: Option<String>,

    /// Thumbnail for video uploads: a local path, or None for the default
    #[serde(default)]
    pub thumbnail: Option<PathBuf>,

    /// 1-based index to start processing from (earlier lines are skipped)
    #[serde(default = "default_start_index")]
    pub start_index: u32,
}

impl BatchRequest {
    /// Resolution string for the requested quality, for captions
    pub fn resolution_label(&self) -> &'static str {
        match self.quality.as_str() {
            "144" => "256x144",
            "240" => "426x240",
            "360" => "640x360",
            "480" => "854x480",
            "720" => "1280x720",
            "1080" => "1920x1080",
            _ => "UN",
        }
    }

    /// Validate the request before any work starts
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.batch_name.trim().is_empty() {
            return Err(crate::error::Error::InvalidRequest(
                "batch_name must not be empty".to_string(),
            ));
        }
        if self.start_index == 0 {
            return Err(crate::error::Error::InvalidRequest(
                "start_index is 1-based and must be >= 1".to_string(),
            ));
        }
        if !self.quality.chars().all(|c| c.is_ascii_digit()) {
            return Err(crate::error::Error::InvalidRequest(format!(
                "quality must be a bare height like \"720\", got {:?}",
                self.quality
            )));
        }
        Ok(())
    }
}

impl Default for BatchRequest {
    fn default() -> Self {
        Self {
            batch_name: "batch".to_string(),
            quality: default_quality(),
            credit: String::new(),
            portal_token: None,
            thumbnail: None,
            start_index: default_start_index(),
        }
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_max_concurrent() -> usize {
    5
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(3600)
}

fn default_transform_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_listen_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_quality() -> String {
    "720".to_string()
}

fn default_start_index() -> u32 {
    1
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./batch-dl.db")
}

fn default_signing_endpoint() -> String {
    "https://api.classplusapp.com/cams/uploader/video/jw-signed-url".to_string()
}

fn default_drm_proxy() -> String {
    "https://dragoapi.vercel.app/classplus?link=".to_string()
}

fn default_portal_proxy() -> String {
    "https://anonymouspwplayer-b99f57957198.herokuapp.com/pw?url=".to_string()
}

fn default_portal_proxy_legacy() -> String {
    "https://anonymousrajputplayer-9ab2f2730a02.herokuapp.com/pw?url=".to_string()
}

fn default_pdf_gateway() -> String {
    "https://dragoapi.vercel.app/pdf/".to_string()
}

fn default_zip_gateway() -> String {
    "https://video.pablocoder.eu.org/appx-zip?url=".to_string()
}

fn default_render_gateway() -> String {
    "http://master-api-v3.vercel.app/utkash-ws".to_string()
}

/// Serialize/deserialize Duration as whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
