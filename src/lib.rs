//! # batch-dl
//!
//! Configurable backend library for batch mirror bots: download a list
//! of URLs with bounded concurrency and upload the results to a
//! messaging destination in strict original order.
//!
//! ## Design Philosophy
//!
//! batch-dl is designed to be:
//! - **Library-first** - No bot framework or UI, purely a Rust crate for embedding
//! - **Trait-bounded** - Transport, fetch tooling, and DRM key resolution stay behind traits
//! - **Failure-isolating** - One bad item never takes down a batch
//! - **Event-driven** - Consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use batch_dl::{BatchPipeline, BatchRequest, Config, ToolFetcher};
//! use std::sync::Arc;
//!
//! # struct MyUploader;
//! # #[async_trait::async_trait]
//! # impl batch_dl::Uploader for MyUploader {
//! #     async fn upload(
//! #         &self,
//! #         _target: batch_dl::ChatTarget,
//! #         _payload: batch_dl::UploadPayload,
//! #         _caption: &str,
//! #     ) -> Result<batch_dl::MessageHandle, batch_dl::UploadError> {
//! #         unimplemented!()
//! #     }
//! # }
//! # struct MyNotifier;
//! # #[async_trait::async_trait]
//! # impl batch_dl::Notifier for MyNotifier {
//! #     async fn notify(&self, _text: &str) {}
//! # }
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let fetcher = Arc::new(ToolFetcher::discover(&config, None)?);
//!     let pipeline = BatchPipeline::new(
//!         config,
//!         fetcher,
//!         Arc::new(MyUploader),
//!         Arc::new(MyNotifier),
//!         -1001234567890,
//!     );
//!
//!     // Subscribe to events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let request = BatchRequest {
//!         batch_name: "Physics 101".to_string(),
//!         ..Default::default()
//!     };
//!     let summary = pipeline
//!         .run_batch("Lecture 1://cdn.example.com/v1.m3u8\n", &request)
//!         .await?;
//!     println!("uploaded {} of {}", summary.stats.uploaded, summary.stats.total);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Fetch execution and external tool running
pub mod fetch;
/// Batch input parsing
pub mod input;
/// Log-channel mirroring
pub mod mirror;
/// Concurrent download-upload pipeline (decomposed into focused submodules)
pub mod pipeline;
/// Retry logic with exponential backoff
pub mod retry;
/// SQLite persistence
pub mod store;
/// Fetch strategy selection and command building
pub mod strategy;
/// URL transformation
pub mod transform;
/// Core data types
pub mod types;
/// Upload abstraction
pub mod upload;
/// Utility functions
pub mod utils;

pub use config::{BatchRequest, Config, MirrorConfig, RetryConfig, TokenConfig, ToolsConfig};
pub use error::{Error, FetchError, ParseError, Result, TransformError, UploadError};
pub use fetch::{DrmManifest, DrmResolver, Fetcher, ToolFetcher};
pub use input::{parse_batch_lines, LinkCensus};
pub use mirror::{LogMirror, MirrorSink};
pub use pipeline::BatchPipeline;
pub use store::Store;
pub use strategy::{select_strategy, FetchPlan, FetchStrategy};
pub use transform::{classify, UrlTransformer};
pub use types::{
    BatchStats, BatchSummary, ContentKind, DownloadItem, Event, ItemIndex, ItemState, SourceKind,
};
pub use upload::{ChatTarget, MessageHandle, Notifier, UploadPayload, Uploader};
