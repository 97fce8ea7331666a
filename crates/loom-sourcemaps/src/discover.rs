// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Finds source maps below a directory.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::transform::DEPENDENCY_DIR;

const MAP_EXTENSION: &str = "map";

fn is_dependency_dir(entry: &DirEntry) -> bool {
	entry.depth() > 0 && entry.file_type().is_dir() && entry.file_name() == DEPENDENCY_DIR
}

/// Returns every `*.map` file under `root` in file-name order, skipping
/// dependency directories.
pub fn discover_source_maps(root: &Path) -> Result<Vec<PathBuf>, walkdir::Error> {
	let mut maps = Vec::new();
	let walker = WalkDir::new(root)
		.follow_links(true)
		.sort_by_file_name()
		.into_iter()
		.filter_entry(|entry| !is_dependency_dir(entry));

	for entry in walker {
		let entry = entry?;
		if entry.file_type().is_file()
			&& entry.path().extension().is_some_and(|ext| ext == MAP_EXTENSION)
		{
			maps.push(entry.into_path());
		}
	}
	Ok(maps)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn touch(root: &Path, relative: &str) {
		let path = root.join(relative);
		std::fs::create_dir_all(path.parent().unwrap()).unwrap();
		std::fs::write(path, "{}").unwrap();
	}

	#[test]
	fn finds_maps_recursively_and_skips_dependencies() {
		let dir = tempfile::tempdir().unwrap();
		touch(dir.path(), "dist/main.js.map");
		touch(dir.path(), "dist/main.js");
		touch(dir.path(), "dist/chunks/vendor.js.map");
		touch(dir.path(), "node_modules/lib/index.js.map");
		touch(dir.path(), "packages/a/node_modules/b/x.js.map");
		touch(dir.path(), "README.md");

		let found = discover_source_maps(dir.path()).unwrap();
		let relative: Vec<_> = found
			.iter()
			.map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
			.collect();

		assert_eq!(
			relative,
			vec![
				PathBuf::from("dist/chunks/vendor.js.map"),
				PathBuf::from("dist/main.js.map"),
			]
		);
	}

	#[test]
	fn empty_directory_finds_nothing() {
		let dir = tempfile::tempdir().unwrap();
		assert!(discover_source_maps(dir.path()).unwrap().is_empty());
	}

	#[test]
	fn missing_directory_is_an_error() {
		let dir = tempfile::tempdir().unwrap();
		assert!(discover_source_maps(&dir.path().join("nope")).is_err());
	}
}
