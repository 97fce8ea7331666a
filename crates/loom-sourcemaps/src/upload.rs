// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Upload orchestration.
//!
//! One upload runs: resolve options, rewrite the map into a temporary
//! workspace (when stripping the project root), build the form, send it,
//! then remove the workspace whatever the outcome. Directory mode runs that
//! pipeline for every map found, a bounded number at a time.

use std::io;
use std::path::{Path, PathBuf};

use futures::{stream, StreamExt, TryStreamExt};
use tracing::{info, instrument, warn};

use crate::discover::discover_source_maps;
use crate::error::{ConfigError, Result, UploadError};
use crate::options::{resolve_options, UploadOptions, UploadOptionsLayer};
use crate::request::{into_multipart, prepare_request};
use crate::transform::{transform, TempWorkspace};
use crate::transport::{Transport, TransportConfig};

/// Maps uploaded at the same time in directory mode.
pub const MAX_CONCURRENT_UPLOADS: usize = 5;

#[derive(Debug, Clone)]
pub struct UploaderConfig {
	pub transport: TransportConfig,
	/// Parent for temporary workspaces; the system temp dir when unset.
	pub temp_root: Option<PathBuf>,
	pub max_concurrent_uploads: usize,
}

impl Default for UploaderConfig {
	fn default() -> Self {
		Self {
			transport: TransportConfig::default(),
			temp_root: None,
			max_concurrent_uploads: MAX_CONCURRENT_UPLOADS,
		}
	}
}

impl UploaderConfig {
	pub fn from_env() -> Self {
		Self {
			transport: TransportConfig::from_env(),
			..Self::default()
		}
	}
}

/// Source maps that were accepted by the upload API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
	/// Original (not rewritten) map paths, sorted.
	pub uploaded: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Uploader {
	transport: Transport,
	temp_root: Option<PathBuf>,
	max_concurrent_uploads: usize,
}

impl Uploader {
	pub fn new(config: UploaderConfig) -> Result<Self> {
		Ok(Self {
			transport: Transport::new(config.transport)?,
			temp_root: config.temp_root,
			max_concurrent_uploads: config.max_concurrent_uploads.max(1),
		})
	}

	pub fn from_env() -> Result<Self> {
		Self::new(UploaderConfig::from_env())
	}

	/// Resolves `layer` against the working directory and uploads.
	pub async fn upload(&self, layer: UploadOptionsLayer) -> Result<UploadSummary> {
		let options = resolve_options(layer).await?;
		self.upload_options(options).await
	}

	/// Uploads already resolved options: one map, or every map in
	/// `options.directory`.
	pub async fn upload_options(&self, options: UploadOptions) -> Result<UploadSummary> {
		let mut uploaded = match options.directory.clone() {
			Some(directory) => self.upload_many(&options, &directory).await?,
			None => vec![self.upload_one(options).await?],
		};
		uploaded.sort();
		Ok(UploadSummary { uploaded })
	}

	#[instrument(skip_all, fields(directory = %directory.display()))]
	async fn upload_many(&self, options: &UploadOptions, directory: &Path) -> Result<Vec<PathBuf>> {
		let root = directory.to_path_buf();
		let maps = tokio::task::spawn_blocking(move || discover_source_maps(&root))
			.await
			.map_err(|e| UploadError::Discovery(io::Error::other(e)))?
			.map_err(|e| UploadError::Discovery(e.into()))?;

		info!(count = maps.len(), "found source map(s) to upload");

		stream::iter(maps)
			.map(|map| self.upload_one(options.for_discovered_map(map)))
			.buffer_unordered(self.max_concurrent_uploads)
			.try_collect()
			.await
	}

	/// Runs the single-map pipeline, always removing the temporary workspace.
	async fn upload_one(&self, mut options: UploadOptions) -> Result<PathBuf> {
		let source_map = options
			.source_map
			.clone()
			.ok_or(ConfigError::MissingSourceMap)?;
		let name = display_name(&source_map);
		info!(source_map = %name, "uploading source map");

		options.apply_wildcard_prefix();

		let workspace = if options.strip_project_root {
			Some(self.create_workspace()?)
		} else {
			None
		};

		let outcome = self.transform_and_send(options, workspace.as_ref()).await;
		let cleanup = match workspace {
			Some(workspace) => {
				let path = workspace.path().to_path_buf();
				workspace
					.close()
					.map_err(|source| UploadError::Cleanup { path, source })
			}
			None => Ok(()),
		};

		match (outcome, cleanup) {
			(Ok(()), Ok(())) => {
				info!(source_map = %name, "upload successful");
				Ok(source_map)
			}
			(Ok(()), Err(cleanup_err)) => Err(cleanup_err),
			(Err(err), Ok(())) => Err(err),
			(Err(err), Err(cleanup_err)) => {
				warn!(error = %cleanup_err, "ignoring cleanup failure after failed upload");
				Err(err)
			}
		}
	}

	async fn transform_and_send(
		&self,
		options: UploadOptions,
		workspace: Option<&TempWorkspace>,
	) -> Result<()> {
		let options = match workspace {
			Some(workspace) => transform(options, workspace).await?,
			None => options,
		};

		let fields = prepare_request(&options);
		self.transport
			.send(&options.endpoint, |activity| {
				let fields = fields.clone();
				async move { into_multipart(fields, &activity).await }
			})
			.await
	}

	fn create_workspace(&self) -> Result<TempWorkspace> {
		let workspace = match &self.temp_root {
			Some(parent) => TempWorkspace::create_in(parent),
			None => TempWorkspace::create(),
		};
		workspace.map_err(UploadError::Workspace)
	}
}

fn display_name(path: &Path) -> String {
	path.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_else(|| path.display().to_string())
}
