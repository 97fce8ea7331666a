// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Upload options: partial layers, defaults and validation.
//!
//! Callers (CLI flags, config files, environment) produce
//! [`UploadOptionsLayer`]s where every field is optional. Layers are merged
//! field by field and then resolved into an immutable [`UploadOptions`] with
//! defaults applied and cross-option constraints checked.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::app_version::find_app_version;
use crate::error::ConfigError;
use crate::path::absolutize;

/// Upload API used when no endpoint is configured.
pub const DEFAULT_ENDPOINT: &str = "https://upload.bugsnag.com";

/// Marker that makes the upload API match a path on any host.
pub const WILDCARD_PREFIX: char = '*';

/// Directory mode as written in a config file: `true` searches the project
/// root, a string searches that path.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DirectorySelection {
	Enabled(bool),
	Path(PathBuf),
}

/// Partial option set - all fields are Option for merging.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct UploadOptionsLayer {
	pub api_key: Option<String>,
	pub app_version: Option<String>,
	pub code_bundle_id: Option<String>,
	pub minified_url: Option<String>,
	pub source_map: Option<PathBuf>,
	pub minified_file: Option<PathBuf>,
	pub directory: Option<DirectorySelection>,
	pub endpoint: Option<String>,
	pub project_root: Option<PathBuf>,
	pub upload_sources: Option<bool>,
	pub upload_node_modules: Option<bool>,
	pub strip_project_root: Option<bool>,
	pub add_wildcard_prefix: Option<bool>,
	pub overwrite: Option<bool>,
	pub extra_fields: Option<BTreeMap<String, String>>,
}

impl fmt::Debug for UploadOptionsLayer {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("UploadOptionsLayer")
			.field("api_key", &self.api_key.as_ref().map(|_| REDACTED))
			.field("app_version", &self.app_version)
			.field("code_bundle_id", &self.code_bundle_id)
			.field("minified_url", &self.minified_url)
			.field("source_map", &self.source_map)
			.field("minified_file", &self.minified_file)
			.field("directory", &self.directory)
			.field("endpoint", &self.endpoint)
			.field("project_root", &self.project_root)
			.field("upload_sources", &self.upload_sources)
			.field("upload_node_modules", &self.upload_node_modules)
			.field("strip_project_root", &self.strip_project_root)
			.field("add_wildcard_prefix", &self.add_wildcard_prefix)
			.field("overwrite", &self.overwrite)
			.field("extra_fields", &self.extra_fields)
			.finish()
	}
}

const REDACTED: &str = "[REDACTED]";

fn override_with<T>(target: &mut Option<T>, source: Option<T>) {
	if source.is_some() {
		*target = source;
	}
}

impl UploadOptionsLayer {
	/// Applies `other` on top of `self`; set fields in `other` win.
	pub fn merge(&mut self, other: UploadOptionsLayer) {
		override_with(&mut self.api_key, other.api_key);
		override_with(&mut self.app_version, other.app_version);
		override_with(&mut self.code_bundle_id, other.code_bundle_id);
		override_with(&mut self.minified_url, other.minified_url);
		override_with(&mut self.source_map, other.source_map);
		override_with(&mut self.minified_file, other.minified_file);
		override_with(&mut self.directory, other.directory);
		override_with(&mut self.endpoint, other.endpoint);
		override_with(&mut self.project_root, other.project_root);
		override_with(&mut self.upload_sources, other.upload_sources);
		override_with(&mut self.upload_node_modules, other.upload_node_modules);
		override_with(&mut self.strip_project_root, other.strip_project_root);
		override_with(&mut self.add_wildcard_prefix, other.add_wildcard_prefix);
		override_with(&mut self.overwrite, other.overwrite);

		if let Some(fields) = other.extra_fields {
			self.extra_fields.get_or_insert_with(BTreeMap::new).extend(fields);
		}
	}
}

/// Which release the uploaded map belongs to.
///
/// A code bundle id takes the place of the app version in the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseIdentity {
	AppVersion(String),
	CodeBundleId(String),
}

impl ReleaseIdentity {
	pub fn field_name(&self) -> &'static str {
		match self {
			ReleaseIdentity::AppVersion(_) => "appVersion",
			ReleaseIdentity::CodeBundleId(_) => "codeBundleId",
		}
	}

	pub fn value(&self) -> &str {
		match self {
			ReleaseIdentity::AppVersion(v) | ReleaseIdentity::CodeBundleId(v) => v,
		}
	}
}

/// Content for an extra source file in the upload bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFile {
	/// Streamed from disk when the request is built.
	Path(PathBuf),
	/// Already in memory.
	Buffer { file_name: String, data: Bytes },
}

/// Fully resolved options for uploading one source map (or a directory of them).
#[derive(Clone)]
pub struct UploadOptions {
	pub api_key: String,
	pub release: Option<ReleaseIdentity>,
	pub minified_url: Option<String>,
	pub source_map: Option<PathBuf>,
	pub minified_file: Option<PathBuf>,
	/// Search this directory for `*.map` files instead of uploading `source_map`.
	pub directory: Option<PathBuf>,
	pub endpoint: Url,
	/// Always absolute when present.
	pub project_root: Option<PathBuf>,
	pub upload_sources: bool,
	pub upload_node_modules: bool,
	pub strip_project_root: bool,
	pub add_wildcard_prefix: bool,
	pub overwrite: bool,
	/// Extra source files keyed by the path the rewritten map refers to them by.
	pub sources: BTreeMap<String, SourceFile>,
	/// Additional form fields passed through to the upload API.
	pub extra_fields: BTreeMap<String, String>,
}

impl fmt::Debug for UploadOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("UploadOptions")
			.field("api_key", &REDACTED)
			.field("release", &self.release)
			.field("minified_url", &self.minified_url)
			.field("source_map", &self.source_map)
			.field("minified_file", &self.minified_file)
			.field("directory", &self.directory)
			.field("endpoint", &self.endpoint.as_str())
			.field("project_root", &self.project_root)
			.field("upload_sources", &self.upload_sources)
			.field("upload_node_modules", &self.upload_node_modules)
			.field("strip_project_root", &self.strip_project_root)
			.field("add_wildcard_prefix", &self.add_wildcard_prefix)
			.field("overwrite", &self.overwrite)
			.field("sources", &self.sources)
			.field("extra_fields", &self.extra_fields)
			.finish()
	}
}

fn non_empty(value: Option<String>) -> Option<String> {
	value
		.map(|v| v.trim().to_string())
		.filter(|v| !v.is_empty())
}

fn non_empty_path(value: Option<PathBuf>) -> Option<PathBuf> {
	value.filter(|p| !p.as_os_str().is_empty())
}

impl UploadOptions {
	/// Applies defaults and validates a merged layer. Relative paths are
	/// resolved against `cwd`. Performs no I/O.
	pub fn from_layer(layer: UploadOptionsLayer, cwd: &Path) -> Result<Self, ConfigError> {
		let api_key = non_empty(layer.api_key).ok_or(ConfigError::MissingApiKey)?;

		let source_map = non_empty_path(layer.source_map).map(|p| absolutize(cwd, &p));
		let directory = match layer.directory {
			None | Some(DirectorySelection::Enabled(false)) => None,
			Some(selection) => Some(selection),
		};
		if source_map.is_none() && directory.is_none() {
			return Err(ConfigError::MissingSourceMap);
		}

		let add_wildcard_prefix = layer.add_wildcard_prefix.unwrap_or(false);
		let strip_project_root = add_wildcard_prefix || layer.strip_project_root.unwrap_or(true);
		let upload_sources = layer.upload_sources.unwrap_or(false);
		let upload_node_modules = layer.upload_node_modules.unwrap_or(false);

		// An explicitly empty project root means "none"; an absent one means the cwd.
		let project_root = match layer.project_root {
			None => Some(cwd.to_path_buf()),
			Some(root) if root.as_os_str().is_empty() => None,
			Some(root) => Some(absolutize(cwd, &root)),
		};
		if upload_sources && project_root.is_none() {
			return Err(ConfigError::ProjectRootRequiredForSources);
		}
		if strip_project_root && project_root.is_none() {
			return Err(ConfigError::ProjectRootRequiredForStrip);
		}

		let endpoint = layer
			.endpoint
			.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
		let endpoint = Url::parse(&endpoint).map_err(|source| ConfigError::InvalidEndpoint {
			url: endpoint.clone(),
			source,
		})?;

		let directory = directory.map(|selection| match selection {
			DirectorySelection::Path(path) => absolutize(cwd, &path),
			DirectorySelection::Enabled(_) => project_root.clone().unwrap_or_else(|| cwd.to_path_buf()),
		});

		let release = match (non_empty(layer.code_bundle_id), non_empty(layer.app_version)) {
			(Some(id), _) => Some(ReleaseIdentity::CodeBundleId(id)),
			(None, Some(version)) => Some(ReleaseIdentity::AppVersion(version)),
			(None, None) => None,
		};

		Ok(Self {
			api_key,
			release,
			minified_url: non_empty(layer.minified_url),
			source_map,
			minified_file: non_empty_path(layer.minified_file).map(|p| absolutize(cwd, &p)),
			directory,
			endpoint,
			project_root,
			upload_sources,
			upload_node_modules,
			strip_project_root,
			add_wildcard_prefix,
			overwrite: layer.overwrite.unwrap_or(false),
			sources: BTreeMap::new(),
			extra_fields: layer.extra_fields.unwrap_or_default(),
		})
	}

	/// Prefixes a path-like minified URL with the wildcard when
	/// `add_wildcard_prefix` is set. Full URLs are left alone.
	pub fn apply_wildcard_prefix(&mut self) {
		if !self.add_wildcard_prefix {
			return;
		}
		if let Some(url) = self.minified_url.as_mut() {
			if !url.contains("://") && !url.starts_with(WILDCARD_PREFIX) {
				url.insert(0, WILDCARD_PREFIX);
			}
		}
	}

	/// Options for one map found in directory mode.
	///
	/// The minified file sits next to the map without the `.map` suffix and
	/// its URL is its path relative to the project root.
	pub fn for_discovered_map(&self, source_map: PathBuf) -> UploadOptions {
		let minified_file = source_map.with_extension("");
		let base = self
			.project_root
			.as_deref()
			.or(self.directory.as_deref());
		let minified_url = match base.and_then(|base| minified_file.strip_prefix(base).ok()) {
			Some(relative) => relative
				.components()
				.map(|c| c.as_os_str().to_string_lossy())
				.collect::<Vec<_>>()
				.join("/"),
			None => minified_file.to_string_lossy().into_owned(),
		};

		UploadOptions {
			minified_url: Some(minified_url),
			source_map: Some(source_map),
			minified_file: Some(minified_file),
			directory: None,
			sources: BTreeMap::new(),
			..self.clone()
		}
	}
}

/// Resolves a merged layer against the current working directory, then
/// fills in the app version from `package.json` when no release was given.
pub async fn resolve_options(layer: UploadOptionsLayer) -> Result<UploadOptions, ConfigError> {
	let cwd = std::env::current_dir().map_err(ConfigError::WorkingDirectory)?;
	resolve_options_in(layer, &cwd).await
}

/// [`resolve_options`] with an explicit working directory.
pub async fn resolve_options_in(
	layer: UploadOptionsLayer,
	cwd: &Path,
) -> Result<UploadOptions, ConfigError> {
	let mut options = UploadOptions::from_layer(layer, cwd)?;

	if options.release.is_none() {
		let start = options
			.project_root
			.clone()
			.unwrap_or_else(|| cwd.to_path_buf());
		if let Some(version) = find_app_version(&start).await {
			debug!(version = %version, "app version not provided, using package manifest");
			options.release = Some(ReleaseIdentity::AppVersion(version));
		}
	}

	Ok(options)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn layer() -> UploadOptionsLayer {
		UploadOptionsLayer {
			api_key: Some("API_KEY".to_string()),
			source_map: Some(PathBuf::from("dist/app.js.map")),
			..Default::default()
		}
	}

	fn cwd() -> PathBuf {
		PathBuf::from("/home/dev/project")
	}

	#[test]
	fn requires_api_key() {
		let err = UploadOptions::from_layer(UploadOptionsLayer::default(), &cwd()).unwrap_err();
		assert!(matches!(err, ConfigError::MissingApiKey));

		let blank = UploadOptionsLayer {
			api_key: Some("   ".to_string()),
			..layer()
		};
		assert!(matches!(
			UploadOptions::from_layer(blank, &cwd()),
			Err(ConfigError::MissingApiKey)
		));
	}

	#[test]
	fn requires_source_map_unless_directory_mode() {
		let no_map = UploadOptionsLayer {
			source_map: None,
			..layer()
		};
		assert!(matches!(
			UploadOptions::from_layer(no_map.clone(), &cwd()),
			Err(ConfigError::MissingSourceMap)
		));

		let directory = UploadOptionsLayer {
			directory: Some(DirectorySelection::Enabled(true)),
			..no_map
		};
		let options = UploadOptions::from_layer(directory, &cwd()).unwrap();
		assert_eq!(options.directory, Some(cwd()));
	}

	#[test]
	fn applies_defaults() {
		let options = UploadOptions::from_layer(layer(), &cwd()).unwrap();

		assert_eq!(options.endpoint.as_str(), "https://upload.bugsnag.com/");
		assert_eq!(options.project_root, Some(cwd()));
		assert_eq!(
			options.source_map,
			Some(PathBuf::from("/home/dev/project/dist/app.js.map"))
		);
		assert!(options.strip_project_root);
		assert!(!options.upload_sources);
		assert!(!options.upload_node_modules);
		assert!(!options.add_wildcard_prefix);
		assert!(!options.overwrite);
		assert!(options.sources.is_empty());
		assert_eq!(options.release, None);
	}

	#[test]
	fn wildcard_prefix_forces_root_stripping() {
		let options = UploadOptions::from_layer(
			UploadOptionsLayer {
				add_wildcard_prefix: Some(true),
				strip_project_root: Some(false),
				..layer()
			},
			&cwd(),
		)
		.unwrap();
		assert!(options.strip_project_root);
	}

	#[test]
	fn explicit_empty_project_root_is_rejected_when_needed() {
		let err = UploadOptions::from_layer(
			UploadOptionsLayer {
				project_root: Some(PathBuf::new()),
				upload_sources: Some(true),
				..layer()
			},
			&cwd(),
		)
		.unwrap_err();
		assert!(matches!(err, ConfigError::ProjectRootRequiredForSources));

		let err = UploadOptions::from_layer(
			UploadOptionsLayer {
				project_root: Some(PathBuf::new()),
				..layer()
			},
			&cwd(),
		)
		.unwrap_err();
		assert!(matches!(err, ConfigError::ProjectRootRequiredForStrip));

		let options = UploadOptions::from_layer(
			UploadOptionsLayer {
				project_root: Some(PathBuf::new()),
				strip_project_root: Some(false),
				..layer()
			},
			&cwd(),
		)
		.unwrap();
		assert_eq!(options.project_root, None);
	}

	#[test]
	fn relative_project_root_is_made_absolute() {
		let options = UploadOptions::from_layer(
			UploadOptionsLayer {
				project_root: Some(PathBuf::from("../other")),
				..layer()
			},
			&cwd(),
		)
		.unwrap();
		assert_eq!(options.project_root, Some(PathBuf::from("/home/dev/other")));
	}

	#[test]
	fn invalid_endpoint_is_a_config_error() {
		let err = UploadOptions::from_layer(
			UploadOptionsLayer {
				endpoint: Some("1231..;".to_string()),
				..layer()
			},
			&cwd(),
		)
		.unwrap_err();
		assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));
	}

	#[test]
	fn code_bundle_id_replaces_app_version() {
		let options = UploadOptions::from_layer(
			UploadOptionsLayer {
				app_version: Some("1.0.0".to_string()),
				code_bundle_id: Some("1.0-123".to_string()),
				..layer()
			},
			&cwd(),
		)
		.unwrap();
		assert_eq!(
			options.release,
			Some(ReleaseIdentity::CodeBundleId("1.0-123".to_string()))
		);

		let options = UploadOptions::from_layer(
			UploadOptionsLayer {
				app_version: Some("1.0.0".to_string()),
				..layer()
			},
			&cwd(),
		)
		.unwrap();
		assert_eq!(
			options.release,
			Some(ReleaseIdentity::AppVersion("1.0.0".to_string()))
		);
	}

	#[test]
	fn merge_prefers_later_layers() {
		let mut base = UploadOptionsLayer {
			api_key: Some("from-file".to_string()),
			endpoint: Some("https://upload.example.com".to_string()),
			extra_fields: Some(BTreeMap::from([("a".to_string(), "1".to_string())])),
			..Default::default()
		};
		base.merge(UploadOptionsLayer {
			api_key: Some("from-cli".to_string()),
			upload_sources: Some(true),
			extra_fields: Some(BTreeMap::from([("b".to_string(), "2".to_string())])),
			..Default::default()
		});

		assert_eq!(base.api_key.as_deref(), Some("from-cli"));
		assert_eq!(base.endpoint.as_deref(), Some("https://upload.example.com"));
		assert_eq!(base.upload_sources, Some(true));
		assert_eq!(base.extra_fields.as_ref().map(BTreeMap::len), Some(2));
	}

	#[test]
	fn layer_accepts_bool_or_path_directory() {
		let layer = from_json(r#"{"api_key":"k","directory":"dist","upload_sources":true}"#);
		assert_eq!(
			layer.directory,
			Some(DirectorySelection::Path(PathBuf::from("dist")))
		);
		assert_eq!(layer.upload_sources, Some(true));

		let layer = from_json(r#"{"directory":true}"#);
		assert_eq!(layer.directory, Some(DirectorySelection::Enabled(true)));
	}

	fn from_json(json: &str) -> UploadOptionsLayer {
		serde_json::from_str(json).unwrap()
	}

	#[test]
	fn debug_output_redacts_api_key() {
		let options = UploadOptions::from_layer(layer(), &cwd()).unwrap();
		let rendered = format!("{options:?} {:?}", layer());
		assert!(!rendered.contains("API_KEY"));
		assert!(rendered.contains(REDACTED));
	}

	#[test]
	fn wildcard_prefix_applies_to_path_like_urls_only() {
		let mut options = UploadOptions::from_layer(
			UploadOptionsLayer {
				add_wildcard_prefix: Some(true),
				minified_url: Some("/static/js/main.js".to_string()),
				..layer()
			},
			&cwd(),
		)
		.unwrap();
		options.apply_wildcard_prefix();
		assert_eq!(options.minified_url.as_deref(), Some("*/static/js/main.js"));

		options.apply_wildcard_prefix();
		assert_eq!(options.minified_url.as_deref(), Some("*/static/js/main.js"));

		options.minified_url = Some("https://cdn.example.com/main.js".to_string());
		options.apply_wildcard_prefix();
		assert_eq!(
			options.minified_url.as_deref(),
			Some("https://cdn.example.com/main.js")
		);
	}

	#[test]
	fn discovered_map_options() {
		let options = UploadOptions::from_layer(
			UploadOptionsLayer {
				source_map: None,
				directory: Some(DirectorySelection::Path(PathBuf::from("dist"))),
				..layer()
			},
			&cwd(),
		)
		.unwrap();

		let per_map =
			options.for_discovered_map(PathBuf::from("/home/dev/project/dist/services/widget.js.map"));
		assert_eq!(per_map.minified_url.as_deref(), Some("dist/services/widget.js"));
		assert_eq!(
			per_map.minified_file,
			Some(PathBuf::from("/home/dev/project/dist/services/widget.js"))
		);
		assert_eq!(
			per_map.source_map,
			Some(PathBuf::from("/home/dev/project/dist/services/widget.js.map"))
		);
		assert_eq!(per_map.directory, None);
		assert!(per_map.sources.is_empty());
	}

	#[tokio::test]
	async fn resolve_fills_app_version_from_manifest() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("package.json"), r#"{"version":"3.1.4"}"#).unwrap();

		let options = resolve_options_in(layer(), dir.path()).await.unwrap();
		assert_eq!(
			options.release,
			Some(ReleaseIdentity::AppVersion("3.1.4".to_string()))
		);

		let options = resolve_options_in(
			UploadOptionsLayer {
				code_bundle_id: Some("bundle-7".to_string()),
				..layer()
			},
			dir.path(),
		)
		.await
		.unwrap();
		assert_eq!(
			options.release,
			Some(ReleaseIdentity::CodeBundleId("bundle-7".to_string()))
		);
	}
}
