// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Shared HTTP client with consistent User-Agent header.

use reqwest::{Client, ClientBuilder};

/// Product token used in the User-Agent header.
const PRODUCT: &str = "loom-sourcemaps";

/// Creates a new HTTP client builder with the standard User-Agent header.
///
/// Callers customize it before building (e.g., set a connect timeout).
///
/// # Example
/// ```ignore
/// let client = loom_common_http::builder()
///     .connect_timeout(Duration::from_secs(30))
///     .build()?;
/// ```
pub fn builder() -> ClientBuilder {
	Client::builder().user_agent(user_agent())
}

/// Returns the standard User-Agent string.
///
/// Format: `loom-sourcemaps/{version}/{os}-{arch}`
/// Example: `loom-sourcemaps/0.1.0/linux-x86_64`
pub fn user_agent() -> String {
	format!(
		"{}/{}/{}-{}",
		PRODUCT,
		env!("CARGO_PKG_VERSION"),
		std::env::consts::OS,
		std::env::consts::ARCH
	)
}
