// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! App version lookup from the nearest `package.json`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::probe::is_regular_file;

const MANIFEST_FILE: &str = "package.json";

#[derive(Debug, Deserialize)]
struct PackageManifest {
	#[serde(default)]
	version: Option<String>,
}

/// Finds the nearest `package.json` at or above `start`.
pub async fn find_manifest(start: &Path) -> Option<PathBuf> {
	for dir in start.ancestors() {
		let candidate = dir.join(MANIFEST_FILE);
		if is_regular_file(&candidate).await {
			return Some(candidate);
		}
	}
	None
}

/// Reads the `version` of the nearest `package.json` at or above `start`.
///
/// Only the nearest manifest is consulted. A manifest without a version, or
/// one that cannot be read or parsed, yields `None`.
pub async fn find_app_version(start: &Path) -> Option<String> {
	let manifest = find_manifest(start).await?;

	let content = match tokio::fs::read(&manifest).await {
		Ok(content) => content,
		Err(e) => {
			debug!(path = %manifest.display(), error = %e, "could not read package manifest");
			return None;
		}
	};

	match serde_json::from_slice::<PackageManifest>(&content) {
		Ok(PackageManifest {
			version: Some(version),
		}) if !version.trim().is_empty() => {
			debug!(path = %manifest.display(), version = %version, "using app version from package manifest");
			Some(version)
		}
		Ok(_) => None,
		Err(e) => {
			debug!(path = %manifest.display(), error = %e, "could not parse package manifest");
			None
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn reads_version_from_nearest_manifest() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(
			dir.path().join("package.json"),
			r#"{"name":"outer","version":"2.0.0"}"#,
		)
		.unwrap();
		let nested = dir.path().join("packages/web");
		std::fs::create_dir_all(&nested).unwrap();
		std::fs::write(
			nested.join("package.json"),
			r#"{"name":"web","version":"1.4.2"}"#,
		)
		.unwrap();

		assert_eq!(find_app_version(&nested).await.as_deref(), Some("1.4.2"));
		assert_eq!(
			find_app_version(&nested.join("src")).await.as_deref(),
			Some("1.4.2")
		);
	}

	#[tokio::test]
	async fn empty_version_is_ignored() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(
			dir.path().join("package.json"),
			r#"{"name":"app","version":""}"#,
		)
		.unwrap();

		assert_eq!(find_app_version(dir.path()).await, None);
	}

	#[tokio::test]
	async fn nearest_manifest_wins_even_without_version() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("package.json"), r#"{"version":"9.9.9"}"#).unwrap();
		let nested = dir.path().join("app");
		std::fs::create_dir_all(&nested).unwrap();
		std::fs::write(nested.join("package.json"), r#"{"private":true}"#).unwrap();

		assert_eq!(find_app_version(&nested).await, None);
	}

	#[tokio::test]
	async fn malformed_manifest_is_not_an_error() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("package.json"), "{ not json").unwrap();

		assert_eq!(find_app_version(dir.path()).await, None);
	}
}
