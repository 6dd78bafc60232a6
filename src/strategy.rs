//! Fetch strategy selection and tool command building
//!
//! Maps a transformed URL to the procedure that retrieves it and, where
//! the external fetch tool is involved, builds the full invocation.
//! Categories are tested in a fixed order, first match wins.

use crate::config::{BatchRequest, Config};
use crate::types::ContentKind;
use crate::utils::url_extension;
use std::path::PathBuf;

/// Image suffixes handled by the generic media strategy
const IMAGE_EXTS: [&str; 3] = [".jpg", ".jpeg", ".png"];

/// Audio suffixes handled by the generic media strategy
const AUDIO_EXTS: [&str; 3] = [".mp3", ".wav", ".m4a"];

/// Marker for streams carrying an inline decryption key after `*`
const ENCRYPTED_MARKER: &str = "encrypted.m";

/// Markers for DRM manifests that need external key resolution
const DRM_MARKERS: [&str; 2] = ["drmcdni", "drm/wv"];

/// PDF host family behind anti-bot protection, fetched by scraping client
const SCRAPE_PDF_MARKER: &str = "cwmediabkt99";

/// Signed-CDN hosts that need referer and CDN-tag headers on the fetch
const HEADERED_CDN_MARKERS: [&str; 2] = ["webvideos.classplusapp.", "media-cdn.classplusapp.com"];

/// HLS host family fetched with conservative segment parallelism
const GENTLE_HLS_MARKER: &str = "classplusapp.com";

/// Host family whose streams are remuxed into mkv
const REMUX_MARKER: &str = "acecwply";

/// Pre-signed URLs fetched without a format expression
const PRESIGNED_MARKER: &str = "jw-prod";

/// URL shape driving the format expression
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatShape {
    /// Native video-host link; mp4 container with m4a audio
    NativeHost,
    /// Embed link; any container, best video + best audio
    Embed,
    /// Everything else; permissive fallback chain
    Default,
}

impl FormatShape {
    /// Shape of a URL, by marker
    pub fn of(url: &str) -> Self {
        if url.contains("youtu") {
            FormatShape::NativeHost
        } else if url.contains("embed") {
            FormatShape::Embed
        } else {
            FormatShape::Default
        }
    }
}

/// Quality-capped format selection expression for the fetch tool
pub fn format_expression(shape: FormatShape, quality: &str) -> String {
    match shape {
        FormatShape::NativeHost => format!(
            "b[height<={quality}][ext=mp4]/bv[height<={quality}][ext=mp4]+ba[ext=m4a]/b[ext=mp4]"
        ),
        FormatShape::Embed => {
            format!("bestvideo[height<={quality}]+bestaudio/best[height<={quality}]")
        }
        FormatShape::Default => {
            format!("b[height<={quality}]/bv[height<={quality}]+ba/b/bv+ba")
        }
    }
}

/// The chosen fetch procedure for an item
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Direct HTTP download (cloud-drive share links)
    Direct,
    /// PDF document; `scrape` selects the anti-bot scraping client
    Pdf {
        /// Fetch through the scraping HTTP client instead of the tool
        scrape: bool,
    },
    /// Page rendered to HTML through the external render gateway
    RenderedHtml,
    /// No byte download; the URL itself is the upload payload
    ZipLink,
    /// Generic media fetch, extension preserved
    Media {
        /// Output extension taken from the URL
        ext: String,
    },
    /// Encrypted stream with an inline key stripped from the URL
    EncryptedStream {
        /// Decryption key extracted from the URL
        key: String,
    },
    /// DRM manifest; keys resolved externally, then decrypt-and-merge
    Drm,
    /// HLS playlist with accelerated parallel segment fetching
    Hls {
        /// Use the conservative per-host connection counts
        gentle: bool,
    },
    /// Generic video fetch with a quality-capped format expression
    Video {
        /// URL shape driving the format expression
        shape: FormatShape,
    },
}

/// One external tool invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchCommand {
    /// Arguments passed to the fetch tool, in order
    pub args: Vec<String>,
}

/// Everything a worker needs to retrieve one item
#[derive(Clone, Debug)]
pub struct FetchPlan {
    /// Selected strategy
    pub strategy: FetchStrategy,
    /// Content category the strategy implies
    pub content: ContentKind,
    /// Effective fetch URL (key-stripped or gateway-routed where needed)
    pub url: String,
    /// Expected artifact location; None when nothing is downloaded
    pub output: Option<PathBuf>,
    /// Tool invocation; None for strategies the fetcher handles directly
    pub command: Option<FetchCommand>,
}

/// Select the fetch strategy for a resolved URL and build its invocation
pub fn select_strategy(
    url: &str,
    name: &str,
    request: &BatchRequest,
    config: &Config,
) -> FetchPlan {
    let dir = config.download_dir();
    let out = |file: String| Some(dir.join(file));
    let quality = request.quality.as_str();

    if url.contains("drive") {
        return FetchPlan {
            strategy: FetchStrategy::Direct,
            content: ContentKind::Document,
            url: url.to_string(),
            output: out(format!("{name}.bin")),
            command: None,
        };
    }

    if url.contains(".pdf") {
        let scrape = url.contains(SCRAPE_PDF_MARKER);
        let command = if scrape {
            None
        } else {
            Some(FetchCommand {
                args: media_args(url, &dir.join(format!("{name}.pdf"))),
            })
        };
        return FetchPlan {
            strategy: FetchStrategy::Pdf { scrape },
            content: ContentKind::Pdf,
            url: url.to_string(),
            output: out(format!("{name}.pdf")),
            command,
        };
    }

    if url.ends_with(".ws") {
        let token = config.tokens.render_token.as_deref().unwrap_or_default();
        return FetchPlan {
            strategy: FetchStrategy::RenderedHtml,
            content: ContentKind::Html,
            url: format!(
                "{}?url={}&authorization={}",
                config.tokens.render_gateway, url, token
            ),
            output: out(format!("{name}.html")),
            command: None,
        };
    }

    if url.contains(".zip") {
        return FetchPlan {
            strategy: FetchStrategy::ZipLink,
            content: ContentKind::ZipLink,
            url: url.to_string(),
            output: None,
            command: None,
        };
    }

    if let Some(ext) = media_ext(url, &IMAGE_EXTS) {
        let output = dir.join(format!("{name}.{ext}"));
        return FetchPlan {
            strategy: FetchStrategy::Media { ext: ext.clone() },
            content: ContentKind::Image,
            url: url.to_string(),
            command: Some(FetchCommand {
                args: media_args(url, &output),
            }),
            output: Some(output),
        };
    }

    if let Some(ext) = media_ext(url, &AUDIO_EXTS) {
        let output = dir.join(format!("{name}.{ext}"));
        return FetchPlan {
            strategy: FetchStrategy::Media { ext: ext.clone() },
            content: ContentKind::Audio,
            url: url.to_string(),
            command: Some(FetchCommand {
                args: media_args(url, &output),
            }),
            output: Some(output),
        };
    }

    if url.contains(ENCRYPTED_MARKER) {
        let (stream_url, key) = match url.split_once('*') {
            Some((u, k)) => (u.to_string(), k.to_string()),
            None => (url.to_string(), String::new()),
        };
        let output = dir.join(format!("{name}.mp4"));
        let command = Some(FetchCommand {
            args: video_args(&stream_url, name, quality, &output, config),
        });
        return FetchPlan {
            strategy: FetchStrategy::EncryptedStream { key },
            content: ContentKind::EncryptedStream,
            url: stream_url,
            output: Some(output),
            command,
        };
    }

    if DRM_MARKERS.iter().any(|m| url.contains(m)) {
        return FetchPlan {
            strategy: FetchStrategy::Drm,
            content: ContentKind::DrmStream,
            url: url.to_string(),
            output: out(format!("{name}.mp4")),
            command: None,
        };
    }

    if url.ends_with(".m3u8") || url.contains(GENTLE_HLS_MARKER) {
        let gentle = url.contains(GENTLE_HLS_MARKER);
        let output = dir.join(format!("{name}.mp4"));
        let mut args = video_args(url, name, quality, &output, config);
        args.extend(hls_acceleration_args(gentle));
        return FetchPlan {
            strategy: FetchStrategy::Hls { gentle },
            content: ContentKind::Hls,
            url: url.to_string(),
            output: Some(output),
            command: Some(FetchCommand { args }),
        };
    }

    let shape = FormatShape::of(url);
    let output = dir.join(format!("{name}.mp4"));
    let command = Some(FetchCommand {
        args: video_args(url, name, quality, &output, config),
    });
    FetchPlan {
        strategy: FetchStrategy::Video { shape },
        content: ContentKind::Video,
        url: url.to_string(),
        output: Some(output),
        command,
    }
}

fn media_ext(url: &str, table: &[&str]) -> Option<String> {
    if table.iter().any(|e| url.ends_with(e)) {
        url_extension(url).map(str::to_string)
    } else {
        None
    }
}

/// Arguments for plain media/document fetches: output, url, fragment retries
fn media_args(url: &str, output: &std::path::Path) -> Vec<String> {
    vec![
        "-o".to_string(),
        output.display().to_string(),
        url.to_string(),
        "-R".to_string(),
        "25".to_string(),
        "--fragment-retries".to_string(),
        "25".to_string(),
    ]
}

/// Arguments for video fetches, varying by host family
fn video_args(
    url: &str,
    _name: &str,
    quality: &str,
    output: &std::path::Path,
    config: &Config,
) -> Vec<String> {
    let ytf = format_expression(FormatShape::of(url), quality);
    let out = output.display().to_string();

    if url.contains(PRESIGNED_MARKER) {
        return vec!["-o".to_string(), out, url.to_string()];
    }

    if HEADERED_CDN_MARKERS.iter().any(|m| url.contains(m)) {
        let mut args = vec![
            "--add-header".to_string(),
            "referer:https://web.classplusapp.com/".to_string(),
            "--add-header".to_string(),
            "x-cdn-tag:empty".to_string(),
        ];
        if url.ends_with(".m3u8") {
            args.push("--hls-prefer-ffmpeg".to_string());
        }
        args.extend([
            "-f".to_string(),
            ytf,
            url.to_string(),
            "-o".to_string(),
            out,
        ]);
        return args;
    }

    if url.contains("youtube.com") || url.contains("youtu.be") {
        let cookies = config
            .tools
            .cookies_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "youtube_cookies.txt".to_string());
        return vec![
            "--cookies".to_string(),
            cookies,
            "-f".to_string(),
            ytf,
            url.to_string(),
            "-o".to_string(),
            out,
        ];
    }

    if url.contains(REMUX_MARKER) {
        return vec![
            "-o".to_string(),
            out,
            "-f".to_string(),
            format!("bestvideo[height<={quality}]+bestaudio"),
            "--hls-prefer-ffmpeg".to_string(),
            "--no-keep-video".to_string(),
            "--remux-video".to_string(),
            "mkv".to_string(),
            "--no-warning".to_string(),
            url.to_string(),
        ];
    }

    vec![
        "-f".to_string(),
        ytf,
        url.to_string(),
        "-o".to_string(),
        out,
    ]
}

/// External-downloader acceleration for HLS playlists
///
/// Conservative connection counts for the gentle host family, which
/// rejects aggressive parallelism.
fn hls_acceleration_args(gentle: bool) -> Vec<String> {
    if gentle {
        vec![
            "--no-check-certificate".to_string(),
            "--external-downloader".to_string(),
            "aria2c".to_string(),
            "--downloader-args".to_string(),
            "aria2c: -x 8 -j 8 -s 8".to_string(),
        ]
    } else {
        vec![
            "--external-downloader".to_string(),
            "aria2c".to_string(),
            "--downloader-args".to_string(),
            "aria2c: -x 16 -j 32".to_string(),
        ]
    }
}
