// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Source map upload pipeline for Loom crash symbolication.
//!
//! This crate provides:
//! - Project-root stripping for posix and Windows paths
//! - Rewriting of a source map's `sources` into portable relative paths,
//!   optionally bundling the referenced files
//! - Multipart request construction for the upload API
//! - Retrying delivery with retryable/terminal error classification
//! - Single-map and directory uploads with guaranteed temp cleanup
//!
//! # Example
//!
//! ```no_run
//! use loom_sourcemaps::{Uploader, UploadOptionsLayer};
//!
//! # async fn run() -> loom_sourcemaps::Result<()> {
//! let uploader = Uploader::from_env()?;
//! let summary = uploader
//! 	.upload(UploadOptionsLayer {
//! 		api_key: Some("YOUR_API_KEY".to_string()),
//! 		source_map: Some("dist/main.js.map".into()),
//! 		minified_file: Some("dist/main.js".into()),
//! 		minified_url: Some("https://example.com/main.js".to_string()),
//! 		..Default::default()
//! 	})
//! 	.await?;
//! println!("uploaded {} map(s)", summary.uploaded.len());
//! # Ok(())
//! # }
//! ```

pub mod app_version;
pub mod discover;
pub mod error;
pub mod options;
pub mod path;
pub mod probe;
pub mod request;
pub mod transform;
pub mod transport;
pub mod upload;

pub use error::{ConfigError, Result, SourceMapError, UploadError};
pub use options::{
	resolve_options, resolve_options_in, DirectorySelection, ReleaseIdentity, SourceFile,
	UploadOptions, UploadOptionsLayer, DEFAULT_ENDPOINT,
};
pub use path::strip_project_root;
pub use probe::is_regular_file;
pub use request::{into_multipart, prepare_request, FieldValue, FormField};
pub use transform::{transform, TempWorkspace};
pub use transport::{Transport, TransportConfig, MAX_ATTEMPTS};
pub use upload::{UploadSummary, Uploader, UploaderConfig, MAX_CONCURRENT_UPLOADS};
