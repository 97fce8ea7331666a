// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Source map path rewriting.
//!
//! Reads a source map, rewrites every entry of `sources` (and of
//! `sections[].map.sources`) to a project-root-relative path, optionally
//! collects the referenced files for upload, and writes the rewritten map
//! into a [`TempWorkspace`]. The original map is never modified.

use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tempfile::TempDir;
use tracing::{debug, instrument};

use crate::error::{ConfigError, SourceMapError, UploadError};
use crate::options::{SourceFile, UploadOptions};
use crate::path::{is_project_root, resolve_path, strip_project_root};
use crate::probe::is_regular_file;

const WORKSPACE_PREFIX: &str = "loom-sourcemaps";

/// Directory name of installed third-party packages.
pub const DEPENDENCY_DIR: &str = "node_modules";

/// A uniquely named temporary directory holding one rewritten source map.
///
/// Dropping the workspace removes it on a best-effort basis; call
/// [`TempWorkspace::close`] to observe removal errors.
#[derive(Debug)]
pub struct TempWorkspace {
	dir: TempDir,
}

impl TempWorkspace {
	/// Creates a workspace in the system temp directory.
	pub fn create() -> io::Result<Self> {
		let dir = tempfile::Builder::new().prefix(WORKSPACE_PREFIX).tempdir()?;
		Ok(Self { dir })
	}

	/// Creates a workspace under `parent`.
	pub fn create_in(parent: &Path) -> io::Result<Self> {
		let dir = tempfile::Builder::new()
			.prefix(WORKSPACE_PREFIX)
			.tempdir_in(parent)?;
		Ok(Self { dir })
	}

	pub fn path(&self) -> &Path {
		self.dir.path()
	}

	/// Removes the workspace and everything in it.
	pub fn close(self) -> io::Result<()> {
		self.dir.close()
	}
}

/// Returns true for entries such as `webpack:///./src/index.js` that name
/// bundler-internal content with no file on disk.
pub fn is_virtual_source(source: &str) -> bool {
	let Some((scheme, _)) = source.split_once("://") else {
		return false;
	};
	let mut chars = scheme.chars();
	let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
	starts_with_letter
		&& scheme.len() > 1
		&& chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Returns true if any segment of `path` is the dependency directory.
pub fn is_dependency_path(path: &Path) -> bool {
	path.components()
		.any(|c| c.as_os_str() == DEPENDENCY_DIR)
}

/// Every `sources` array in the document, top-level first, then each
/// section's embedded map in order.
fn source_lists_mut(document: &mut Value) -> Vec<&mut Vec<Value>> {
	let Some(object) = document.as_object_mut() else {
		return Vec::new();
	};

	let mut lists = Vec::new();
	let mut sections = None;
	for (key, value) in object.iter_mut() {
		match (key.as_str(), value) {
			("sources", Value::Array(sources)) => lists.insert(0, sources),
			("sections", Value::Array(s)) => sections = Some(s),
			_ => {}
		}
	}

	if let Some(sections) = sections {
		for section in sections.iter_mut() {
			if let Some(Value::Array(sources)) = section
				.get_mut("map")
				.and_then(|map| map.get_mut("sources"))
			{
				lists.push(sources);
			}
		}
	}
	lists
}

/// Per-map rewrite state.
struct SourceRewriter<'a> {
	map_dir: &'a Path,
	project_root: String,
	upload_sources: bool,
	upload_node_modules: bool,
}

impl SourceRewriter<'_> {
	/// Rewrites one entry, returning the replacement (if any) and the file to
	/// bundle (if any).
	async fn rewrite(&self, source: &str) -> (Option<String>, Option<(String, PathBuf)>) {
		if is_virtual_source(source) {
			return (None, None);
		}

		let resolved = resolve_path(self.map_dir, source);
		let resolved_str = resolved.to_string_lossy().into_owned();
		// An entry naming the root has no relative form; keep what the map had.
		if is_project_root(&self.project_root, &resolved_str) {
			return (None, None);
		}
		let relative = strip_project_root(&self.project_root, &resolved_str);

		let mut include = None;
		if self.upload_sources && is_regular_file(&resolved).await {
			if !self.upload_node_modules && is_dependency_path(&resolved) {
				debug!(source = %relative, "excluding dependency source from upload");
			} else {
				debug!(source = %relative, path = %resolved.display(), "including source in upload");
				include = Some((relative.clone(), resolved));
			}
		}

		(Some(relative), include)
	}
}

/// Rewrites the source map named by `options.source_map` into `workspace`.
///
/// Returns the options with `source_map` pointing at the rewritten copy and
/// `sources` extended with the files selected for upload.
#[instrument(skip_all, fields(source_map = ?options.source_map))]
pub async fn transform(
	mut options: UploadOptions,
	workspace: &TempWorkspace,
) -> Result<UploadOptions, UploadError> {
	let Some(source_map) = options.source_map.clone() else {
		return Err(ConfigError::MissingSourceMap.into());
	};
	let mut document = read_source_map(&source_map).await?;

	let map_dir = source_map.parent().unwrap_or_else(|| Path::new(""));
	let rewriter = SourceRewriter {
		map_dir,
		project_root: options
			.project_root
			.as_deref()
			.map(|p| p.to_string_lossy().into_owned())
			.unwrap_or_default(),
		upload_sources: options.upload_sources,
		upload_node_modules: options.upload_node_modules,
	};

	// Entries are processed strictly in order so that `sources` is built deterministically.
	for list in source_lists_mut(&mut document) {
		for entry in list.iter_mut() {
			let Value::String(source) = entry else {
				continue;
			};
			let (replacement, include) = rewriter.rewrite(source).await;
			if let Some((key, path)) = include {
				options.sources.insert(key, SourceFile::Path(path));
			}
			if let Some(replacement) = replacement {
				*source = replacement;
			}
		}
	}

	let file_name = source_map
		.file_name()
		.map(PathBuf::from)
		.unwrap_or_else(|| PathBuf::from("source.map"));
	let output = workspace.path().join(file_name);
	write_source_map(&output, &document).await?;
	debug!(path = %output.display(), "wrote rewritten source map");

	options.source_map = Some(output);
	Ok(options)
}

async fn read_source_map(path: &Path) -> Result<Value, SourceMapError> {
	let content = tokio::fs::read(path).await.map_err(|source| match source.kind() {
		io::ErrorKind::NotFound => SourceMapError::NotFound {
			path: path.to_path_buf(),
		},
		_ => SourceMapError::Unreadable {
			path: path.to_path_buf(),
			source,
		},
	})?;

	serde_json::from_slice(&content).map_err(|source| SourceMapError::InvalidJson {
		path: path.to_path_buf(),
		source,
	})
}

async fn write_source_map(path: &Path, document: &Value) -> Result<(), SourceMapError> {
	let unwritable = |source: io::Error| SourceMapError::Unwritable {
		path: path.to_path_buf(),
		source,
	};
	let content = serde_json::to_vec(document).map_err(|e| unwritable(e.into()))?;
	tokio::fs::write(path, content).await.map_err(unwritable)
}
