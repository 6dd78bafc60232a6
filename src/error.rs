//! Error types for batch-dl
//!
//! This module provides the error taxonomy for the library:
//! - Per-item errors (transform, fetch, upload) that never abort a batch
//! - Batch-level errors (parse, timeout, database) that do
//! - Pass-through variants for I/O, HTTP and serialization failures

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for batch-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for batch-dl
///
/// Per-item variants (`Transform`, `Fetch`, `Upload`) are caught at the
/// worker/sequencer boundary and recorded on the failing item. Batch-level
/// variants (`Parse`, `Timeout`, `Database`) abort the whole run.
#[derive(Debug, Error)]
pub enum Error {
    /// URL could not be resolved or signed
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),

    /// Retrieval tool reported a failure or produced no output
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Messaging endpoint rejected the send
    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    /// Batch input could not be parsed into any work items
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Interactive configuration step exceeded its wait window
    #[error("timed out after {waited_secs}s waiting for input")]
    Timeout {
        /// How long the step waited before giving up
        waited_secs: u64,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid batch request (bad start index, unknown quality, ...)
    #[error("invalid batch request: {0}")]
    InvalidRequest(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// URL transformation errors
#[derive(Debug, Error)]
pub enum TransformError {
    /// Embed page fetched but no playlist manifest URL was found in the body
    #[error("no playlist manifest found in embed page at {url}")]
    ManifestNotFound {
        /// The embed page that was scraped
        url: String,
    },

    /// Signing endpoint returned a non-success status or an unusable body
    #[error("signing endpoint failed for {url}: {reason}")]
    SigningFailed {
        /// The URL being signed
        url: String,
        /// Endpoint status or decode failure description
        reason: String,
    },

    /// A required access token is missing from the configuration
    #[error("missing token for {kind} URLs")]
    MissingToken {
        /// Which token family was required (signing, portal, ...)
        kind: &'static str,
    },

    /// Network failure while resolving the URL
    #[error("network failure while transforming URL: {0}")]
    Network(#[from] reqwest::Error),
}

/// Fetch (download) errors
#[derive(Debug, Error)]
pub enum FetchError {
    /// External tool exited with a non-zero status
    #[error("fetch tool exited with status {status}: {stderr}")]
    ToolFailed {
        /// Process exit code, or -1 when killed by a signal
        status: i32,
        /// Trailing stderr output for diagnostics
        stderr: String,
    },

    /// Tool reported success but the expected output file does not exist
    #[error("fetch produced no output file matching {template}")]
    OutputMissing {
        /// Output path template that was probed
        template: String,
    },

    /// Fetch tool binary could not be located
    #[error("fetch tool not found: {0}")]
    ToolNotFound(String),

    /// Fetch exceeded the configured timeout
    #[error("fetch timed out after {timeout_secs}s")]
    TimedOut {
        /// Configured fetch timeout
        timeout_secs: u64,
    },

    /// DRM manifest or decryption keys could not be resolved
    #[error("failed to resolve DRM manifest/keys for {url}")]
    DrmUnresolved {
        /// The manifest URL that was queried
        url: String,
    },

    /// Direct HTTP download failed
    #[error("HTTP download failed with status {status}")]
    HttpStatus {
        /// Response status code
        status: u16,
    },

    /// All retry attempts were exhausted
    #[error("fetch failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Number of attempts that were made
        attempts: u32,
        /// Message from the final attempt
        last_error: String,
    },

    /// I/O failure while writing the artifact
    #[error("I/O error during fetch: {0}")]
    Io(#[from] std::io::Error),

    /// Network failure during a direct download
    #[error("network failure during fetch: {0}")]
    Network(#[from] reqwest::Error),
}

/// Upload errors
#[derive(Debug, Error)]
pub enum UploadError {
    /// The messaging endpoint rejected the send
    #[error("endpoint rejected upload of {name}: {reason}")]
    Rejected {
        /// Display name of the item
        name: String,
        /// Endpoint-provided failure reason
        reason: String,
    },

    /// Local artifact vanished before the upload could read it
    #[error("artifact missing at {path}")]
    ArtifactMissing {
        /// Expected artifact location
        path: PathBuf,
    },

    /// I/O failure while reading the artifact
    #[error("I/O error during upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Batch input parsing errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Input file was empty
    #[error("input file is empty")]
    EmptyInput,

    /// No line contained a recognizable link
    #[error("no valid links found in input")]
    NoLinks,

    /// Start index points past the end of the list
    #[error("start index {start} exceeds item count {count}")]
    StartOutOfRange {
        /// Requested 1-based start index
        start: u32,
        /// Number of parsed items
        count: u32,
    },
}

impl Error {
    /// Whether this error fails only the item it occurred on, leaving the
    /// rest of the batch to proceed.
    pub fn is_item_scoped(&self) -> bool {
        matches!(
            self,
            Error::Transform(_) | Error::Fetch(_) | Error::Upload(_)
        )
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_scoped_classification() {
        assert!(Error::Transform(TransformError::MissingToken { kind: "portal" }).is_item_scoped());
        assert!(Error::Fetch(FetchError::HttpStatus { status: 503 }).is_item_scoped());
        assert!(
            Error::Upload(UploadError::Rejected {
                name: "x".into(),
                reason: "flood".into()
            })
            .is_item_scoped()
        );
        assert!(!Error::Parse(ParseError::EmptyInput).is_item_scoped());
        assert!(!Error::Timeout { waited_secs: 300 }.is_item_scoped());
    }

    #[test]
    fn display_includes_context() {
        let e = FetchError::RetriesExhausted {
            attempts: 3,
            last_error: "tool exited 1".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("tool exited 1"));
    }

    #[test]
    fn parse_error_start_out_of_range_display() {
        let e = ParseError::StartOutOfRange { start: 9, count: 4 };
        assert_eq!(e.to_string(), "start index 9 exceeds item count 4");
    }
}
