// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: config file, environment, CLI.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use loom_sourcemaps::UploadOptionsLayer;
use serde::Deserialize;
use tracing::{debug, trace};

/// Workspace config file, relative to the working directory.
pub const WORKSPACE_CONFIG: &str = ".loom/sourcemaps.toml";

/// Prefix of option environment variables.
pub const ENV_PREFIX: &str = "LOOM_SOURCEMAPS_";

/// Errors raised while loading configuration sources.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
	#[error("could not read config file {}: {source}", .path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("TOML parse error in {}: {source}", .path.display())]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("Invalid value for {variable}: {value:?} (expected true or false)")]
	InvalidBool { variable: String, value: String },
}

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	File = 20,
	FileEnvironment = 30,
	Environment = 40,
	Cli = 50,
}

pub trait ConfigSource {
	/// Name for logging
	fn name(&self) -> &'static str;

	fn precedence(&self) -> Precedence;

	fn load(&self) -> Result<UploadOptionsLayer, LoadError>;
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
	#[serde(flatten)]
	options: UploadOptionsLayer,
	#[serde(default)]
	environments: BTreeMap<String, UploadOptionsLayer>,
}

fn read_config_file(path: &Path, required: bool) -> Result<Option<ConfigFile>, LoadError> {
	if !required && !path.exists() {
		debug!(path = %path.display(), "config file not found, skipping");
		return Ok(None);
	}

	debug!(path = %path.display(), "loading config file");
	let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
		path: path.to_path_buf(),
		source,
	})?;
	let file = toml::from_str(&content).map_err(|source| LoadError::TomlParse {
		path: path.to_path_buf(),
		source,
	})?;
	Ok(Some(file))
}

/// Top-level options of a TOML config file.
pub struct FileSource {
	path: PathBuf,
	required: bool,
}

impl FileSource {
	/// `.loom/sourcemaps.toml` under `cwd`; skipped when absent.
	pub fn workspace(cwd: &Path) -> Self {
		Self {
			path: cwd.join(WORKSPACE_CONFIG),
			required: false,
		}
	}

	/// A file named on the command line; must exist.
	pub fn custom(path: PathBuf) -> Self {
		Self {
			path,
			required: true,
		}
	}

	/// The `[environments.<name>]` section of this file.
	pub fn environment(&self, name: impl Into<String>) -> FileEnvironmentSource {
		FileEnvironmentSource {
			path: self.path.clone(),
			required: self.required,
			name: name.into(),
		}
	}
}

impl ConfigSource for FileSource {
	fn name(&self) -> &'static str {
		"config-file"
	}
	fn precedence(&self) -> Precedence {
		Precedence::File
	}

	fn load(&self) -> Result<UploadOptionsLayer, LoadError> {
		Ok(read_config_file(&self.path, self.required)?
			.map(|file| file.options)
			.unwrap_or_default())
	}
}

/// A named environment section of a TOML config file.
pub struct FileEnvironmentSource {
	path: PathBuf,
	required: bool,
	name: String,
}

impl ConfigSource for FileEnvironmentSource {
	fn name(&self) -> &'static str {
		"config-file-environment"
	}
	fn precedence(&self) -> Precedence {
		Precedence::FileEnvironment
	}

	fn load(&self) -> Result<UploadOptionsLayer, LoadError> {
		let section = read_config_file(&self.path, self.required)?
			.and_then(|mut file| file.environments.remove(&self.name));
		match section {
			Some(layer) => {
				debug!(environment = %self.name, "applying environment section");
				Ok(layer)
			}
			None => Ok(UploadOptionsLayer::default()),
		}
	}
}

/// Name of the environment section to apply: `LOOM_ENV`, then `NODE_ENV`.
pub fn environment_name(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
	["LOOM_ENV", "NODE_ENV"]
		.into_iter()
		.filter_map(|key| lookup(key))
		.map(|value| value.trim().to_string())
		.find(|value| !value.is_empty())
}

/// `LOOM_SOURCEMAPS_*` environment variables.
pub struct EnvSource {
	vars: Vec<(String, String)>,
}

impl EnvSource {
	pub fn from_process() -> Self {
		Self::from_vars(std::env::vars())
	}

	pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
		Self {
			vars: vars
				.into_iter()
				.filter(|(key, _)| key.starts_with(ENV_PREFIX))
				.collect(),
		}
	}
}

fn parse_bool(variable: &str, value: &str) -> Result<bool, LoadError> {
	match value.to_ascii_lowercase().as_str() {
		"1" | "true" | "yes" => Ok(true),
		"0" | "false" | "no" => Ok(false),
		_ => Err(LoadError::InvalidBool {
			variable: variable.to_string(),
			value: value.to_string(),
		}),
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}
	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<UploadOptionsLayer, LoadError> {
		let mut layer = UploadOptionsLayer::default();

		for (key, value) in &self.vars {
			let value = value.trim();
			if value.is_empty() {
				continue;
			}
			let Some(field) = key.strip_prefix(ENV_PREFIX) else {
				continue;
			};

			trace!(key = %key, "processing env var");

			match field {
				"API_KEY" => layer.api_key = Some(value.to_string()),
				"APP_VERSION" => layer.app_version = Some(value.to_string()),
				"CODE_BUNDLE_ID" => layer.code_bundle_id = Some(value.to_string()),
				"ENDPOINT" => layer.endpoint = Some(value.to_string()),
				"PROJECT_ROOT" => layer.project_root = Some(PathBuf::from(value)),
				"UPLOAD_SOURCES" => layer.upload_sources = Some(parse_bool(key, value)?),
				"UPLOAD_NODE_MODULES" => layer.upload_node_modules = Some(parse_bool(key, value)?),
				"STRIP_PROJECT_ROOT" => layer.strip_project_root = Some(parse_bool(key, value)?),
				"ADD_WILDCARD_PREFIX" => layer.add_wildcard_prefix = Some(parse_bool(key, value)?),
				"OVERWRITE" => layer.overwrite = Some(parse_bool(key, value)?),
				_ => {
					// Transport tuning and unknown variables are read elsewhere.
				}
			}
		}

		Ok(layer)
	}
}

/// Options given as command-line flags.
pub struct CliSource {
	layer: UploadOptionsLayer,
}

impl CliSource {
	pub fn new(layer: UploadOptionsLayer) -> Self {
		Self { layer }
	}
}

impl ConfigSource for CliSource {
	fn name(&self) -> &'static str {
		"cli"
	}
	fn precedence(&self) -> Precedence {
		Precedence::Cli
	}

	fn load(&self) -> Result<UploadOptionsLayer, LoadError> {
		Ok(self.layer.clone())
	}
}

/// Loads every source and merges them, lowest precedence first.
pub fn merge_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<UploadOptionsLayer, LoadError> {
	sources.sort_by_key(|source| source.precedence());

	let mut merged = UploadOptionsLayer::default();
	for source in &sources {
		debug!(source = source.name(), "loading config source");
		merged.merge(source.load()?);
	}
	Ok(merged)
}

/// Builds the option layer for an upload from all configuration sources.
pub fn load_layer(
	cwd: &Path,
	config_file: Option<PathBuf>,
	cli: UploadOptionsLayer,
) -> Result<UploadOptionsLayer, LoadError> {
	let file = match config_file {
		Some(path) => FileSource::custom(cwd.join(path)),
		None => FileSource::workspace(cwd),
	};

	let mut sources: Vec<Box<dyn ConfigSource>> = Vec::new();
	if let Some(name) = environment_name(|key| std::env::var(key).ok()) {
		sources.push(Box::new(file.environment(name)));
	}
	sources.push(Box::new(file));
	sources.push(Box::new(EnvSource::from_process()));
	sources.push(Box::new(CliSource::new(cli)));

	merge_sources(sources)
}

#[cfg(test)]
mod tests {
	use super::*;
	use loom_sourcemaps::DirectorySelection;

	const CONFIG: &str = r#"
api_key = "from-file"
endpoint = "https://upload.example.com"
upload_sources = true
directory = "dist"

[extra_fields]
buildTool = "vite"

[environments.production]
api_key = "production-key"
overwrite = true
"#;

	fn boxed(source: impl ConfigSource + 'static) -> Box<dyn ConfigSource> {
		Box::new(source)
	}

	fn write_config(dir: &Path) -> PathBuf {
		let path = dir.join(WORKSPACE_CONFIG);
		std::fs::create_dir_all(path.parent().unwrap()).unwrap();
		std::fs::write(&path, CONFIG).unwrap();
		path
	}

	#[test]
	fn workspace_file_is_optional() {
		let dir = tempfile::tempdir().unwrap();
		let layer = FileSource::workspace(dir.path()).load().unwrap();
		assert!(layer.api_key.is_none());
	}

	#[test]
	fn custom_file_must_exist() {
		let dir = tempfile::tempdir().unwrap();
		let err = FileSource::custom(dir.path().join("missing.toml"))
			.load()
			.unwrap_err();
		assert!(matches!(err, LoadError::Io { .. }));
	}

	#[test]
	fn reads_top_level_options() {
		let dir = tempfile::tempdir().unwrap();
		write_config(dir.path());

		let layer = FileSource::workspace(dir.path()).load().unwrap();
		assert_eq!(layer.api_key.as_deref(), Some("from-file"));
		assert_eq!(layer.upload_sources, Some(true));
		assert_eq!(
			layer.directory,
			Some(DirectorySelection::Path(PathBuf::from("dist")))
		);
		assert_eq!(
			layer.extra_fields.unwrap().get("buildTool").map(String::as_str),
			Some("vite")
		);
	}

	#[test]
	fn invalid_toml_is_reported() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("bad.toml");
		std::fs::write(&path, "api_key = ").unwrap();

		let err = FileSource::custom(path).load().unwrap_err();
		assert!(matches!(err, LoadError::TomlParse { .. }));
	}

	#[test]
	fn environment_section_overrides_file() {
		let dir = tempfile::tempdir().unwrap();
		write_config(dir.path());
		let file = FileSource::workspace(dir.path());

		let merged = merge_sources(vec![
			boxed(file.environment("production")),
			boxed(file),
		])
		.unwrap();

		assert_eq!(merged.api_key.as_deref(), Some("production-key"));
		assert_eq!(merged.overwrite, Some(true));
		assert_eq!(merged.endpoint.as_deref(), Some("https://upload.example.com"));
	}

	#[test]
	fn environment_name_prefers_loom_env() {
		let name = environment_name(|key| match key {
			"LOOM_ENV" => Some("staging".to_string()),
			"NODE_ENV" => Some("production".to_string()),
			_ => None,
		});
		assert_eq!(name.as_deref(), Some("staging"));

		let name = environment_name(|key| (key == "NODE_ENV").then(|| "production".to_string()));
		assert_eq!(name.as_deref(), Some("production"));

		assert_eq!(environment_name(|_| None), None);
	}

	#[test]
	fn env_vars_map_to_options() {
		let layer = EnvSource::from_vars([
			("LOOM_SOURCEMAPS_API_KEY".to_string(), "env-key".to_string()),
			("LOOM_SOURCEMAPS_UPLOAD_SOURCES".to_string(), "true".to_string()),
			("LOOM_SOURCEMAPS_OVERWRITE".to_string(), "0".to_string()),
			("LOOM_SOURCEMAPS_RETRY_INTERVAL_MS".to_string(), "10".to_string()),
			("LOOM_SOURCEMAPS_ENDPOINT".to_string(), "  ".to_string()),
			("HOME".to_string(), "/root".to_string()),
		])
		.load()
		.unwrap();

		assert_eq!(layer.api_key.as_deref(), Some("env-key"));
		assert_eq!(layer.upload_sources, Some(true));
		assert_eq!(layer.overwrite, Some(false));
		assert_eq!(layer.endpoint, None);
	}

	#[test]
	fn invalid_env_bool_is_an_error() {
		let err = EnvSource::from_vars([(
			"LOOM_SOURCEMAPS_UPLOAD_SOURCES".to_string(),
			"sometimes".to_string(),
		)])
		.load()
		.unwrap_err();
		assert!(matches!(err, LoadError::InvalidBool { .. }));
	}

	#[test]
	fn precedence_is_file_then_env_then_cli() {
		let dir = tempfile::tempdir().unwrap();
		write_config(dir.path());

		let merged = merge_sources(vec![
			boxed(CliSource::new(UploadOptionsLayer {
				api_key: Some("cli-key".to_string()),
				..Default::default()
			})),
			boxed(EnvSource::from_vars([
				("LOOM_SOURCEMAPS_API_KEY".to_string(), "env-key".to_string()),
				("LOOM_SOURCEMAPS_ENDPOINT".to_string(), "https://env.example.com".to_string()),
			])),
			boxed(FileSource::workspace(dir.path())),
		])
		.unwrap();

		assert_eq!(merged.api_key.as_deref(), Some("cli-key"));
		assert_eq!(merged.endpoint.as_deref(), Some("https://env.example.com"));
		assert_eq!(merged.upload_sources, Some(true));
	}
}
