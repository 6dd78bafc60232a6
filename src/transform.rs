//! URL transformation
//!
//! Rewrites raw input URLs into fetchable form. Each URL is classified
//! once into a [`SourceKind`] and the matching rule families are applied
//! in a fixed precedence; a URL may be rewritten by more than one family
//! in sequence (host substitution, then signing, then suffix gateways).
//!
//! All network calls here carry their own timeout; failures surface as
//! [`TransformError`] and fail only the item being processed.

use crate::config::{BatchRequest, Config, TokenConfig};
use crate::error::TransformError;
use crate::types::SourceKind;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

/// Hosts whose embed page is scraped for a playlist manifest URL
const EMBED_HOSTS: [&str; 1] = ["visionias"];

/// DRM-CDN host/path substitutions applied before proxy or signing
const DRM_SUBSTITUTIONS: [(&str, &str); 1] = [(
    "https://cpvod.testbook.com/",
    "https://media-cdn.classplusapp.com/drm/",
)];

/// DRM-CDN path markers routed through the proxy-rewriting endpoint
const DRM_PROXY_MARKERS: [&str; 1] = ["classplusapp.com/drm/"];

/// CDN hosts whose URLs are exchanged at the signing endpoint
const SIGNED_CDN_MARKERS: [&str; 5] = [
    "tencdn.classplusapp",
    "videos.classplusapp",
    "webvideos.classplusapp.com",
    "media-cdn.classplusapp.com",
    "media-cdn-alisg.classplusapp.com",
];

/// Signed-CDN hosts that additionally require the empty CDN tag header
const CDN_TAG_MARKERS: [&str; 3] = [
    "media-cdn.classplusapp.com",
    "media-cdn-alisg.classplusapp.com",
    "media-cdn-a.classplusapp.com",
];

/// Portal-player hosts routed through the unscrambling proxy
const PORTAL_MARKERS: [&str; 2] = ["d1d34p8vz63oiq", "sec1.pw.live"];

/// Cloud-drive share-link markers
const CLOUD_DRIVE_MARKERS: [&str; 2] = ["drive.google.com", "/file/d/"];

/// Native video-host markers (cookie-authenticated fetch)
const VIDEO_HOST_MARKERS: [&str; 2] = ["youtube.com", "youtu.be"];

/// Classify a URL into its source platform
///
/// Single pass; the transformer and strategy selector dispatch on the
/// result instead of re-testing substrings at each layer.
pub fn classify(url: &str) -> SourceKind {
    if EMBED_HOSTS.iter().any(|m| url.contains(m)) {
        SourceKind::EmbedPlayer
    } else if DRM_SUBSTITUTIONS.iter().any(|(from, _)| url.contains(from))
        || DRM_PROXY_MARKERS.iter().any(|m| url.contains(m))
    {
        SourceKind::DrmCdn
    } else if SIGNED_CDN_MARKERS.iter().any(|m| url.contains(m))
        || CDN_TAG_MARKERS.iter().any(|m| url.contains(m))
    {
        SourceKind::SignedCdn
    } else if (url.contains("childId") && url.contains("parentId"))
        || PORTAL_MARKERS.iter().any(|m| url.contains(m))
    {
        SourceKind::PortalPlayer
    } else if CLOUD_DRIVE_MARKERS.iter().any(|m| url.contains(m)) {
        SourceKind::CloudDrive
    } else if VIDEO_HOST_MARKERS.iter().any(|m| url.contains(m)) {
        SourceKind::VideoHost
    } else {
        SourceKind::Generic
    }
}

/// Normalize share-link shapes before any host-family rules run
///
/// Rewrites drive share links to direct-export form and unwraps
/// no-cookie embed links back to the native host.
pub fn normalize_share_link(url: &str) -> String {
    url.replace("file/d/", "uc?export=download&id=")
        .replace("www.youtube-nocookie.com/embed", "youtu.be")
        .replace("?modestbranding=1", "")
        .replace("/view?usp=sharing", "")
}

fn manifest_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    fn build() -> Regex {
        Regex::new(r#"(https://.*?playlist\.m3u8.*?)""#).expect("manifest regex is valid")
    }
    RE.get_or_init(build)
}

/// URL transformer with its own HTTP client and timeout
pub struct UrlTransformer {
    client: reqwest::Client,
    tokens: TokenConfig,
}

impl UrlTransformer {
    /// Build a transformer from the library configuration
    pub fn new(config: &Config) -> Self {
        Self::with_timeout(config.tokens.clone(), config.download.transform_timeout)
    }

    /// Build a transformer with explicit tokens and timeout
    pub fn with_timeout(tokens: TokenConfig, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client, tokens }
    }

    /// Transform a raw URL into fetchable form
    ///
    /// Applies the matching host family first, then the suffix gateways.
    /// Unrecognized URLs pass through unchanged.
    pub async fn transform(
        &self,
        url: &str,
        request: &BatchRequest,
    ) -> Result<String, TransformError> {
        let url = normalize_share_link(url);
        let mut url = match classify(&url) {
            SourceKind::EmbedPlayer => self.resolve_embed(&url).await?,
            SourceKind::DrmCdn => self.rewrite_drm_cdn(&url),
            SourceKind::SignedCdn => self.sign_url(&url).await?,
            SourceKind::PortalPlayer => self.route_portal(&url, request)?,
            _ => url,
        };

        // Suffix gateways compose with whatever the host family produced
        if url.contains(".pdf*") {
            url = format!("{}{}", self.tokens.pdf_gateway, url);
        }
        if url.contains(".zip") {
            url = format!("{}{}", self.tokens.zip_gateway, url);
        }

        Ok(url)
    }

    /// Fetch an embed page and scrape the playlist manifest URL from it
    pub async fn resolve_embed(&self, url: &str) -> Result<String, TransformError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml")
            .header("Referer", "http://www.visionias.in/")
            .header("Sec-Fetch-Dest", "iframe")
            .header(
                "User-Agent",
                "Mozilla/5.0 (Linux; Android 12) AppleWebKit/537.36 Chrome/107.0.0.0 Mobile",
            )
            .send()
            .await?;
        let body = response.text().await?;

        match manifest_regex().captures(&body) {
            Some(caps) => Ok(caps[1].to_string()),
            None => Err(TransformError::ManifestNotFound {
                url: url.to_string(),
            }),
        }
    }

    /// Apply DRM-CDN host substitutions, then prefix the proxy endpoint
    fn rewrite_drm_cdn(&self, url: &str) -> String {
        let mut url = url.to_string();
        for (from, to) in DRM_SUBSTITUTIONS {
            if url.contains(from) {
                url = url.replace(from, to);
            }
        }
        format!("{}{}", self.tokens.drm_proxy, url)
    }

    /// Exchange a CDN URL for a signed playable URL
    pub async fn sign_url(&self, url: &str) -> Result<String, TransformError> {
        let token =
            self.tokens
                .signing_token
                .as_deref()
                .ok_or(TransformError::MissingToken {
                    kind: "signing",
                })?;

        let mut request = self
            .client
            .get(&self.tokens.signing_endpoint)
            .query(&[("url", url)])
            .header("x-access-token", token);
        if CDN_TAG_MARKERS.iter().any(|m| url.contains(m)) {
            request = request.header("X-CDN-Tag", "empty");
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransformError::SigningFailed {
                url: url.to_string(),
                reason: format!("status {status}"),
            });
        }

        let body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| TransformError::SigningFailed {
                    url: url.to_string(),
                    reason: format!("bad response body: {e}"),
                })?;
        body.get("url")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| TransformError::SigningFailed {
                url: url.to_string(),
                reason: "response missing \"url\" field".to_string(),
            })
    }

    /// Route a portal-player URL through the unscrambling proxy
    fn route_portal(
        &self,
        url: &str,
        request: &BatchRequest,
    ) -> Result<String, TransformError> {
        let token = request
            .portal_token
            .as_deref()
            .or(self.tokens.portal_token.as_deref())
            .ok_or(TransformError::MissingToken { kind: "portal" })?;

        // Legacy parent/child links use the older proxy and a & separator
        if url.contains("childId") && url.contains("parentId") {
            Ok(format!(
                "{}{}&token={}",
                self.tokens.portal_proxy_legacy, url, token
            ))
        } else {
            Ok(format!(
                "{}{}?token={}",
                self.tokens.portal_proxy, url, token
            ))
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transformer(tokens: TokenConfig) -> UrlTransformer {
        UrlTransformer::with_timeout(tokens, Duration::from_secs(5))
    }

    #[test]
    fn classification_table() {
        assert_eq!(
            classify("https://visionias.example/embed/7"),
            SourceKind::EmbedPlayer
        );
        assert_eq!(
            classify("https://cpvod.testbook.com/x/y.mpd"),
            SourceKind::DrmCdn
        );
        assert_eq!(
            classify("https://media-cdn.classplusapp.com/v.m3u8"),
            SourceKind::SignedCdn
        );
        assert_eq!(
            classify("https://sec1.pw.live/stream?x=1"),
            SourceKind::PortalPlayer
        );
        assert_eq!(
            classify("https://host/path?childId=1&parentId=2"),
            SourceKind::PortalPlayer
        );
        assert_eq!(
            classify("https://drive.google.com/file/d/abc"),
            SourceKind::CloudDrive
        );
        assert_eq!(classify("https://youtu.be/xyz"), SourceKind::VideoHost);
        assert_eq!(classify("https://example.com/a.mp4"), SourceKind::Generic);
    }

    #[test]
    fn share_link_normalization() {
        assert_eq!(
            normalize_share_link("https://drive.google.com/file/d/abc/view?usp=sharing"),
            "https://drive.google.com/uc?export=download&id=abc"
        );
        assert_eq!(
            normalize_share_link("https://www.youtube-nocookie.com/embed/xyz?modestbranding=1"),
            "https://youtu.be/xyz"
        );
    }

    #[tokio::test]
    async fn unrecognized_url_passes_through_unchanged() {
        let t = transformer(TokenConfig::default());
        let url = "https://example.com/lesson.mp4";
        let out = t.transform(url, &BatchRequest::default()).await.unwrap();
        assert_eq!(out, url);
    }

    #[tokio::test]
    async fn zip_url_routes_through_zip_gateway() {
        let t = transformer(TokenConfig::default());
        let out = t
            .transform("https://example.com/notes.zip", &BatchRequest::default())
            .await
            .unwrap();
        assert_eq!(
            out,
            "https://video.pablocoder.eu.org/appx-zip?url=https://example.com/notes.zip"
        );
    }

    #[tokio::test]
    async fn wildcard_pdf_routes_through_pdf_gateway() {
        let t = transformer(TokenConfig::default());
        let out = t
            .transform("https://example.com/doc.pdf*", &BatchRequest::default())
            .await
            .unwrap();
        assert!(out.starts_with("https://dragoapi.vercel.app/pdf/"));
        assert!(out.ends_with("doc.pdf*"));
    }

    #[tokio::test]
    async fn drm_cdn_substitution_then_proxy() {
        let t = transformer(TokenConfig::default());
        let out = t
            .transform(
                "https://cpvod.testbook.com/course/1.mpd",
                &BatchRequest::default(),
            )
            .await
            .unwrap();
        assert_eq!(
            out,
            "https://dragoapi.vercel.app/classplus?link=\
             https://media-cdn.classplusapp.com/drm/course/1.mpd"
                .replace(" ", "")
        );
    }

    #[tokio::test]
    async fn portal_url_appends_token_and_proxy() {
        let t = transformer(TokenConfig {
            portal_token: Some("tok123".to_string()),
            ..Default::default()
        });
        let out = t
            .transform("https://sec1.pw.live/v/9.m3u8", &BatchRequest::default())
            .await
            .unwrap();
        assert_eq!(
            out,
            "https://anonymouspwplayer-b99f57957198.herokuapp.com/pw?url=\
             https://sec1.pw.live/v/9.m3u8?token=tok123"
                .replace(" ", "")
        );
    }

    #[tokio::test]
    async fn portal_token_from_request_overrides_config() {
        let t = transformer(TokenConfig {
            portal_token: Some("config-token".to_string()),
            ..Default::default()
        });
        let request = BatchRequest {
            portal_token: Some("request-token".to_string()),
            ..Default::default()
        };
        let out = t
            .transform("https://sec1.pw.live/v/9.m3u8", &request)
            .await
            .unwrap();
        assert!(out.ends_with("?token=request-token"));
    }

    #[tokio::test]
    async fn portal_url_without_token_fails() {
        let t = transformer(TokenConfig::default());
        let err = t
            .transform("https://sec1.pw.live/v/9.m3u8", &BatchRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::MissingToken { kind: "portal" }));
    }

    #[tokio::test]
    async fn signing_endpoint_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sign"))
            .and(query_param("url", "https://tencdn.classplusapp/v.m3u8"))
            .and(header("x-access-token", "sig-token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"url": "https://signed.example/v.m3u8"})),
            )
            .mount(&server)
            .await;

        let t = transformer(TokenConfig {
            signing_token: Some("sig-token".to_string()),
            signing_endpoint: format!("{}/sign", server.uri()),
            ..Default::default()
        });
        let out = t.sign_url("https://tencdn.classplusapp/v.m3u8").await.unwrap();
        assert_eq!(out, "https://signed.example/v.m3u8");
    }

    #[tokio::test]
    async fn signing_failure_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let t = transformer(TokenConfig {
            signing_token: Some("sig-token".to_string()),
            signing_endpoint: server.uri(),
            ..Default::default()
        });
        let err = t.sign_url("https://tencdn.classplusapp/v.m3u8").await.unwrap_err();
        match err {
            TransformError::SigningFailed { reason, .. } => assert!(reason.contains("403")),
            other => panic!("expected SigningFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn embed_page_manifest_scrape() {
        let server = MockServer::start().await;
        let body = r#"<html><script>var src = "https://cdn.example/hls/playlist.m3u8?sig=1";</script></html>"#;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;

        let t = transformer(TokenConfig::default());
        let out = t.resolve_embed(&server.uri()).await.unwrap();
        assert_eq!(out, "https://cdn.example/hls/playlist.m3u8?sig=1");
    }

    #[tokio::test]
    async fn embed_page_without_manifest_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>no streams</html>"))
            .mount(&server)
            .await;

        let t = transformer(TokenConfig::default());
        let err = t.resolve_embed(&server.uri()).await.unwrap_err();
        assert!(matches!(err, TransformError::ManifestNotFound { .. }));
    }
}
