// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the source map upload pipeline.

use std::path::PathBuf;
use std::time::Duration;

use loom_common_http::{is_retryable_status, RetryableError};
use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for upload operations.
pub type Result<T> = std::result::Result<T, UploadError>;

/// Invalid or incomplete options. Raised before any file or network I/O.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("You must provide a valid API key to upload source maps.")]
	MissingApiKey,

	#[error("You must provide a path to the source map you want to upload.")]
	MissingSourceMap,

	#[error(
		"You must provide a project root when uploading sources. \
		 The project root is used to generate relative paths to the sources."
	)]
	ProjectRootRequiredForSources,

	#[error("You must provide a project root when stripping the root path from the source map.")]
	ProjectRootRequiredForStrip,

	#[error("invalid endpoint URL {url:?}: {source}")]
	InvalidEndpoint {
		url: String,
		#[source]
		source: url::ParseError,
	},

	#[error("could not determine the working directory: {0}")]
	WorkingDirectory(#[source] std::io::Error),
}

/// Failure to load or rewrite a source map file.
#[derive(Debug, Error)]
pub enum SourceMapError {
	#[error("Source map file was not valid JSON ({})", .path.display())]
	InvalidJson {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("Source map file does not exist ({})", .path.display())]
	NotFound { path: PathBuf },

	#[error("Source map file could not be read ({})", .path.display())]
	Unreadable {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("Rewritten source map could not be written ({})", .path.display())]
	Unwritable {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

/// Errors that can occur while uploading a source map.
#[derive(Debug, Error)]
pub enum UploadError {
	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error(transparent)]
	SourceMap(#[from] SourceMapError),

	/// The temporary directory for the rewritten map could not be created.
	#[error("could not create temporary workspace: {0}")]
	Workspace(#[source] std::io::Error),

	/// A file referenced by a form field could not be opened for streaming.
	#[error("could not read {field} from {}: {source}", .path.display())]
	UnreadableFile {
		field: String,
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// Searching a directory for source maps failed.
	#[error("could not search for source maps: {0}")]
	Discovery(#[source] std::io::Error),

	/// Connection refused, reset, DNS failure and the like.
	#[error("HTTP request failed: {0}")]
	Network(#[source] reqwest::Error),

	#[error("Connection timed out after {}ms", .0.as_millis())]
	TimedOut(Duration),

	/// HTTP 400 with a JSON body listing validation errors.
	#[error("Invalid payload sent to upload API: {}", .errors.join(", "))]
	InvalidPayload { errors: Vec<String> },

	/// HTTP 400 whose body was not the structured error document.
	#[error("HTTP status 400 received from upload API: {body}")]
	BadRequest { body: String },

	/// Any other non-200 response.
	#[error("HTTP status {} received from upload API", .status.as_u16())]
	Status { status: StatusCode },

	/// Removing the temporary workspace failed after an otherwise successful upload.
	#[error("could not remove temporary workspace {}: {source}", .path.display())]
	Cleanup {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

impl UploadError {
	/// Error messages returned by the upload API, if the failure came from it.
	pub fn api_errors(&self) -> Vec<String> {
		match self {
			UploadError::InvalidPayload { errors } => errors.clone(),
			UploadError::BadRequest { body } => vec![body.clone()],
			_ => Vec::new(),
		}
	}

	/// HTTP status of the failed response, if there was one.
	pub fn status(&self) -> Option<StatusCode> {
		match self {
			UploadError::InvalidPayload { .. } | UploadError::BadRequest { .. } => {
				Some(StatusCode::BAD_REQUEST)
			}
			UploadError::Status { status } => Some(*status),
			UploadError::Network(e) => e.status(),
			_ => None,
		}
	}
}

impl RetryableError for UploadError {
	fn is_retryable(&self) -> bool {
		match self {
			UploadError::Network(e) => e.is_retryable(),
			UploadError::TimedOut(_) => true,
			UploadError::Status { status } => is_retryable_status(*status),
			_ => false,
		}
	}
}
