// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Advisory file existence checks.

use std::path::Path;

use tracing::trace;

/// Returns true only if `path` exists and is a regular file.
///
/// Symlinks are followed. Every stat failure, including not-found and
/// permission errors, is reported as `false`.
pub async fn is_regular_file(path: impl AsRef<Path>) -> bool {
	let path = path.as_ref();
	match tokio::fs::metadata(path).await {
		Ok(metadata) => metadata.is_file(),
		Err(e) => {
			trace!(path = %path.display(), error = %e, "stat failed");
			false
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn regular_file_exists() {
		let dir = tempfile::tempdir().unwrap();
		let file = dir.path().join("index.js");
		std::fs::write(&file, "console.log(1)").unwrap();

		assert!(is_regular_file(&file).await);
	}

	#[tokio::test]
	async fn directory_is_not_a_file() {
		let dir = tempfile::tempdir().unwrap();
		assert!(!is_regular_file(dir.path()).await);
	}

	#[tokio::test]
	async fn missing_path_is_false() {
		let dir = tempfile::tempdir().unwrap();
		assert!(!is_regular_file(dir.path().join("missing.js")).await);
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn symlink_to_file_counts() {
		let dir = tempfile::tempdir().unwrap();
		let target = dir.path().join("target.js");
		let link = dir.path().join("link.js");
		std::fs::write(&target, "x").unwrap();
		std::os::unix::fs::symlink(&target, &link).unwrap();

		assert!(is_regular_file(&link).await);
	}
}
