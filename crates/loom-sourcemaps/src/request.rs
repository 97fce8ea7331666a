// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Multipart payload construction for the upload API.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use tokio_util::io::ReaderStream;

use crate::error::UploadError;
use crate::options::{SourceFile, UploadOptions, WILDCARD_PREFIX};
use crate::transport::Activity;

/// Option names that configure the uploader and are never sent.
pub const CONFIG_ONLY_FIELDS: &[&str] = &[
	"endpoint",
	"uploadSources",
	"uploadNodeModules",
	"projectRoot",
	"stripProjectRoot",
	"addWildcardPrefix",
	"tempDir",
	"agent",
	"directory",
];

/// Value of one form field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
	Text(String),
	/// Streamed from disk when the form is built.
	File(PathBuf),
	Buffer { file_name: String, data: Bytes },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
	pub name: String,
	pub value: FieldValue,
}

impl FormField {
	fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			value: FieldValue::Text(value.into()),
		}
	}

	fn file(name: impl Into<String>, path: &Path) -> Self {
		Self {
			name: name.into(),
			value: FieldValue::File(path.to_path_buf()),
		}
	}
}

/// Lists the form fields for `options` in wire order.
///
/// Configuration-only options are omitted, `overwrite` is only sent when
/// set, and bundled sources are keyed by their (optionally wildcard
/// prefixed) relative path.
pub fn prepare_request(options: &UploadOptions) -> Vec<FormField> {
	let mut fields = vec![FormField::text("apiKey", options.api_key.as_str())];

	if let Some(release) = &options.release {
		fields.push(FormField::text(release.field_name(), release.value()));
	}
	if let Some(url) = &options.minified_url {
		fields.push(FormField::text("minifiedUrl", url.as_str()));
	}
	if let Some(path) = &options.source_map {
		fields.push(FormField::file("sourceMap", path));
	}
	if let Some(path) = &options.minified_file {
		fields.push(FormField::file("minifiedFile", path));
	}
	if options.overwrite {
		fields.push(FormField::text("overwrite", "true"));
	}

	for (name, value) in &options.extra_fields {
		if is_reserved(name) {
			continue;
		}
		fields.push(FormField::text(name.as_str(), value.as_str()));
	}

	for (key, source) in &options.sources {
		let name = if options.add_wildcard_prefix && !key.starts_with(WILDCARD_PREFIX) {
			format!("{WILDCARD_PREFIX}{key}")
		} else {
			key.clone()
		};
		let value = match source {
			SourceFile::Path(path) => FieldValue::File(path.clone()),
			SourceFile::Buffer { file_name, data } => FieldValue::Buffer {
				file_name: file_name.clone(),
				data: data.clone(),
			},
		};
		fields.push(FormField { name, value });
	}

	fields
}

fn is_reserved(name: &str) -> bool {
	CONFIG_ONLY_FIELDS.contains(&name)
		|| matches!(
			name,
			"apiKey" | "appVersion" | "codeBundleId" | "minifiedUrl" | "sourceMap" | "minifiedFile" | "overwrite"
		)
}

/// Opens every file field and assembles the multipart form.
///
/// Field names are sent verbatim since source keys are paths. Every file
/// chunk read into the body is recorded on `activity`.
pub async fn into_multipart(fields: Vec<FormField>, activity: &Activity) -> Result<Form, UploadError> {
	let mut form = Form::new().percent_encode_noop();
	for FormField { name, value } in fields {
		form = match value {
			FieldValue::Text(text) => form.text(name, text),
			FieldValue::File(path) => {
				let part = file_part(&name, &path, activity).await?;
				form.part(name, part)
			}
			FieldValue::Buffer { file_name, data } => {
				let length = data.len() as u64;
				let part = Part::stream_with_length(Body::from(data), length).file_name(file_name);
				form.part(name, part)
			}
		};
	}
	Ok(form)
}

async fn file_part(field: &str, path: &Path, activity: &Activity) -> Result<Part, UploadError> {
	let unreadable = |source: std::io::Error| UploadError::UnreadableFile {
		field: field.to_string(),
		path: path.to_path_buf(),
		source,
	};

	let file = tokio::fs::File::open(path).await.map_err(unreadable)?;
	let metadata = file.metadata().await.map_err(unreadable)?;
	if !metadata.is_file() {
		return Err(unreadable(std::io::Error::new(
			std::io::ErrorKind::InvalidInput,
			"not a regular file",
		)));
	}

	let file_name = path
		.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_else(|| field.to_string());
	let body = Body::wrap_stream(activity.track(ReaderStream::new(file)));
	Ok(Part::stream_with_length(body, metadata.len()).file_name(file_name))
}
