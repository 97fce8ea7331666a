// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cross-platform path handling for source map entries.
//!
//! Source maps built on one machine are uploaded from another, so an entry may
//! be a POSIX path even when running on Windows and vice versa. Everything here
//! works on the string form and never consults the host's path conventions.

use std::path::{Component, Path, PathBuf};

const PARENT: &str = "..";

/// Path convention used to interpret a path string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStyle {
	Posix,
	Windows,
}

/// An absolute path split into its root and normalized segments.
#[derive(Debug, Clone, PartialEq, Eq)]
struct AbsolutePath<'a> {
	root: String,
	segments: Vec<&'a str>,
}

impl PathStyle {
	/// Picks the convention under which `path` is absolute.
	///
	/// POSIX is checked first: every POSIX-absolute path is also rooted under
	/// Windows rules, but a drive-letter path is never POSIX-absolute.
	pub fn detect(path: &str) -> Option<PathStyle> {
		if PathStyle::Posix.is_absolute(path) {
			Some(PathStyle::Posix)
		} else if PathStyle::Windows.is_absolute(path) {
			Some(PathStyle::Windows)
		} else {
			None
		}
	}

	pub fn separator(self) -> &'static str {
		match self {
			PathStyle::Posix => "/",
			PathStyle::Windows => "\\",
		}
	}

	fn is_separator(self, c: char) -> bool {
		match self {
			PathStyle::Posix => c == '/',
			PathStyle::Windows => c == '/' || c == '\\',
		}
	}

	pub fn is_absolute(self, path: &str) -> bool {
		match self {
			PathStyle::Posix => path.starts_with('/'),
			PathStyle::Windows => {
				let bytes = path.as_bytes();
				match bytes {
					[first, ..] if self.is_separator(*first as char) => true,
					[drive, b':', sep, ..] => {
						drive.is_ascii_alphabetic() && self.is_separator(*sep as char)
					}
					_ => false,
				}
			}
		}
	}

	fn segments_eq(self, a: &str, b: &str) -> bool {
		match self {
			PathStyle::Posix => a == b,
			PathStyle::Windows => a.eq_ignore_ascii_case(b),
		}
	}

	fn parse<'a>(self, path: &'a str) -> Option<AbsolutePath<'a>> {
		if !self.is_absolute(path) {
			return None;
		}

		let (root, rest) = match self {
			PathStyle::Posix => (String::from("/"), &path[1..]),
			PathStyle::Windows => self.split_windows_root(path),
		};

		let mut segments: Vec<&str> = Vec::new();
		for segment in rest.split(|c: char| self.is_separator(c)) {
			match segment {
				"" | "." => {}
				PARENT => {
					segments.pop();
				}
				other => segments.push(other),
			}
		}

		Some(AbsolutePath { root, segments })
	}

	/// Splits a Windows path into a comparable root (`C:`, `\\server\share`
	/// or `\` for the current drive) and the remainder.
	fn split_windows_root(self, path: &str) -> (String, &str) {
		let bytes = path.as_bytes();
		if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
			let drive = path[..2].to_ascii_uppercase();
			return (drive, &path[2..]);
		}

		let is_sep = |b: u8| self.is_separator(b as char);
		if bytes.len() > 2 && is_sep(bytes[0]) && is_sep(bytes[1]) && !is_sep(bytes[2]) {
			let unc = &path[2..];
			let mut parts = unc.splitn(3, |c: char| self.is_separator(c));
			if let (Some(server), Some(share)) = (parts.next(), parts.next()) {
				if !share.is_empty() {
					let rest = parts.next().unwrap_or("");
					let root = format!("\\\\{}\\{}", server, share).to_ascii_lowercase();
					return (root, rest);
				}
			}
		}

		(String::from("\\"), path)
	}

	/// Computes the path from `from` to `to` under this convention.
	///
	/// Both must be absolute under this convention and share a root,
	/// otherwise there is no relative path between them.
	pub fn relative(self, from: &str, to: &str) -> Option<String> {
		let from = self.parse(from)?;
		let to = self.parse(to)?;

		let same_root = match self {
			PathStyle::Posix => from.root == to.root,
			PathStyle::Windows => from.root.eq_ignore_ascii_case(&to.root),
		};
		if !same_root {
			return None;
		}

		let common = from
			.segments
			.iter()
			.zip(to.segments.iter())
			.take_while(|(a, b)| self.segments_eq(a, b))
			.count();

		let parts: Vec<&str> = std::iter::repeat(PARENT)
			.take(from.segments.len() - common)
			.chain(to.segments[common..].iter().copied())
			.collect();

		Some(parts.join(self.separator()))
	}
}

/// Rewrites an absolute `path` to be relative to `project_root`.
///
/// The path is returned unchanged when it is not absolute under either
/// convention, when it lies outside the project root, or when it is the
/// project root itself.
pub fn strip_project_root(project_root: &str, path: &str) -> String {
	let Some(style) = PathStyle::detect(path) else {
		return path.to_string();
	};

	match style.relative(project_root, path) {
		Some(relative) if !relative.is_empty() && !starts_with_parent(style, &relative) => relative,
		_ => path.to_string(),
	}
}

/// Whether `path` names `project_root` itself.
pub fn is_project_root(project_root: &str, path: &str) -> bool {
	PathStyle::detect(path)
		.and_then(|style| style.relative(project_root, path))
		.is_some_and(|relative| relative.is_empty())
}

fn starts_with_parent(style: PathStyle, relative: &str) -> bool {
	relative
		.split(|c: char| style.is_separator(c))
		.next()
		.is_some_and(|first| first == PARENT)
}

/// Resolves `path` against `base` without touching the filesystem.
///
/// Absolute paths are returned normalized; `.` and `..` components are
/// folded lexically.
pub fn resolve_path(base: &Path, path: impl AsRef<Path>) -> PathBuf {
	normalize(&base.join(path.as_ref()))
}

/// Lexically removes `.` and `..` components.
pub fn normalize(path: &Path) -> PathBuf {
	let mut normalized = PathBuf::new();
	for component in path.components() {
		match component {
			Component::CurDir => {}
			Component::ParentDir => match normalized.components().next_back() {
				Some(Component::Normal(_)) => {
					normalized.pop();
				}
				Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
				_ => normalized.push(component),
			},
			other => normalized.push(other),
		}
	}
	normalized
}

/// Makes `path` absolute relative to `cwd` (lexically).
pub fn absolutize(cwd: &Path, path: &Path) -> PathBuf {
	if path.is_absolute() {
		normalize(path)
	} else {
		resolve_path(cwd, path)
	}
}
