//! Upload abstraction
//!
//! The messaging endpoint stays behind [`Uploader`]; the pipeline only
//! decides the payload form and the caption. [`Notifier`] carries
//! per-item status and failure text back to the requesting surface.

use crate::config::BatchRequest;
use crate::error::UploadError;
use crate::types::{ContentKind, DownloadItem};
use async_trait::async_trait;
use std::path::PathBuf;

/// Placeholder photo shown under zip link buttons
const ZIP_PLACEHOLDER_PHOTO: &str = "https://envs.sh/cD_.jpg";

/// Destination chat id
pub type ChatTarget = i64;

/// Handle to a message the endpoint accepted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHandle {
    /// Chat the message landed in
    pub chat_id: i64,
    /// Endpoint-assigned message id
    pub message_id: i64,
}

/// One upload in the form the endpoint expects
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadPayload {
    /// Video file with an optional thumbnail
    Video {
        /// Artifact path
        path: PathBuf,
        /// Thumbnail path, endpoint default when None
        thumbnail: Option<PathBuf>,
    },
    /// Generic document
    Document {
        /// Artifact path
        path: PathBuf,
    },
    /// Still image
    Photo {
        /// Artifact path
        path: PathBuf,
    },
    /// Audio file
    Audio {
        /// Artifact path
        path: PathBuf,
    },
    /// Placeholder photo with the content URL behind a button
    LinkButton {
        /// URL the button opens
        url: String,
        /// Placeholder photo URL
        photo_url: String,
    },
    /// Plain text message
    Text(String),
}

/// Sends payloads to the messaging endpoint
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Send one payload with its caption
    async fn upload(
        &self,
        target: ChatTarget,
        payload: UploadPayload,
        caption: &str,
    ) -> Result<MessageHandle, UploadError>;
}

/// Delivers status and failure text to the requesting surface
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Best-effort status delivery; implementations swallow their own errors
    async fn notify(&self, text: &str);
}

/// Build the payload for a downloaded item
///
/// Zip items never have an artifact; everything else must, and a missing
/// one is an upload error rather than a panic.
pub fn payload_for(
    item: &DownloadItem,
    request: &BatchRequest,
) -> Result<UploadPayload, UploadError> {
    if item.content == ContentKind::ZipLink {
        return Ok(UploadPayload::LinkButton {
            url: item.resolved_url.clone(),
            photo_url: ZIP_PLACEHOLDER_PHOTO.to_string(),
        });
    }

    let path = item
        .local_path
        .clone()
        .ok_or_else(|| UploadError::ArtifactMissing {
            path: PathBuf::from(&item.display_name),
        })?;

    Ok(match item.content {
        ContentKind::Pdf | ContentKind::Html | ContentKind::Document => {
            UploadPayload::Document { path }
        }
        ContentKind::Image => UploadPayload::Photo { path },
        ContentKind::Audio => UploadPayload::Audio { path },
        _ => UploadPayload::Video {
            path,
            thumbnail: request.thumbnail.clone(),
        },
    })
}

/// Build the caption for an item
///
/// Zero-padded index linked to the original URL, then title, extension
/// tag, batch name and credit; video kinds also carry the resolution.
pub fn build_caption(item: &DownloadItem, request: &BatchRequest) -> String {
    let index = format!("{:03}", item.index.get());
    let link = item.original_url();
    let ext = item.content.caption_ext();
    let mut caption = format!(
        "[{index}]({link})\nTitle: {name}\nExtension: {credit} {ext}",
        name = item.display_name,
        credit = request.credit,
    );
    if matches!(
        item.content,
        ContentKind::Video | ContentKind::Hls | ContentKind::EncryptedStream | ContentKind::DrmStream
    ) {
        caption.push_str(&format!("\nResolution: [{}]", request.resolution_label()));
    }
    caption.push_str(&format!(
        "\nCourse: {batch}\nExtracted By: {credit}",
        batch = request.batch_name,
        credit = request.credit,
    ));
    caption
}
