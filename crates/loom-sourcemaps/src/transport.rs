// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Retrying multipart delivery to the upload API.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use loom_common_http::{retry, RetryConfig};
use reqwest::multipart::Form;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use crate::error::UploadError;

/// Attempts made before the last error is returned.
pub const MAX_ATTEMPTS: u32 = 5;

pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Upper bound on a single exponential backoff delay.
const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(30);

pub const ENV_RETRY_INTERVAL: &str = "LOOM_SOURCEMAPS_RETRY_INTERVAL_MS";
pub const ENV_TIMEOUT: &str = "LOOM_SOURCEMAPS_TIMEOUT_MS";
pub const ENV_BACKOFF: &str = "LOOM_SOURCEMAPS_BACKOFF";

#[derive(Debug, Clone)]
pub struct TransportConfig {
	pub retry: RetryConfig,
	/// Longest an attempt may go without progress: connecting, sending a body
	/// chunk or receiving the response.
	pub timeout: Duration,
}

impl Default for TransportConfig {
	fn default() -> Self {
		Self {
			retry: RetryConfig::fixed(MAX_ATTEMPTS, DEFAULT_RETRY_INTERVAL),
			timeout: DEFAULT_TIMEOUT,
		}
	}
}

impl TransportConfig {
	/// Reads retry interval, timeout and backoff policy from the process environment.
	pub fn from_env() -> Self {
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Like [`TransportConfig::from_env`] with a custom variable lookup.
	/// Unparseable values fall back to the defaults.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
		let millis = |key: &str, default: Duration| match lookup(key) {
			None => default,
			Some(raw) => match raw.trim().parse::<u64>() {
				Ok(ms) if ms > 0 => Duration::from_millis(ms),
				_ => {
					warn!(variable = key, value = %raw, "ignoring invalid duration");
					default
				}
			},
		};

		let interval = millis(ENV_RETRY_INTERVAL, DEFAULT_RETRY_INTERVAL);
		let timeout = millis(ENV_TIMEOUT, DEFAULT_TIMEOUT);

		let retry = match lookup(ENV_BACKOFF).as_deref().map(str::trim) {
			Some("exponential") => {
				RetryConfig::exponential(MAX_ATTEMPTS, interval, MAX_BACKOFF_DELAY.max(interval))
			}
			None | Some("") | Some("fixed") => RetryConfig::fixed(MAX_ATTEMPTS, interval),
			Some(other) => {
				warn!(variable = ENV_BACKOFF, value = other, "unknown backoff policy, using fixed");
				RetryConfig::fixed(MAX_ATTEMPTS, interval)
			}
		};

		Self { retry, timeout }
	}
}

/// Time of the last observed progress on one upload attempt.
///
/// Clones share the same clock, so a body stream wrapped with
/// [`Activity::track`] keeps the attempt's idle timer from firing.
#[derive(Debug, Clone)]
pub struct Activity {
	started: Instant,
	last_millis: Arc<AtomicU64>,
}

impl Default for Activity {
	fn default() -> Self {
		Self::new()
	}
}

impl Activity {
	pub fn new() -> Self {
		Self {
			started: Instant::now(),
			last_millis: Arc::new(AtomicU64::new(0)),
		}
	}

	/// Records progress now.
	pub fn touch(&self) {
		let elapsed = self.started.elapsed().as_millis();
		self.last_millis
			.fetch_max(u64::try_from(elapsed).unwrap_or(u64::MAX), Ordering::Relaxed);
	}

	/// Time since the last recorded progress.
	pub fn idle(&self) -> Duration {
		let last = Duration::from_millis(self.last_millis.load(Ordering::Relaxed));
		self.started.elapsed().saturating_sub(last)
	}

	/// Counts every item yielded by `stream` as progress.
	pub fn track<S>(&self, stream: S) -> impl Stream<Item = S::Item> + Send + 'static
	where
		S: Stream + Send + 'static,
	{
		let activity = self.clone();
		stream.inspect(move |_| activity.touch())
	}

	/// Resolves once no progress has been recorded for `limit`.
	async fn stalled(&self, limit: Duration) {
		loop {
			let idle = self.idle();
			if idle >= limit {
				return;
			}
			tokio::time::sleep(limit - idle).await;
		}
	}
}

/// HTTP sender with retry and response classification.
#[derive(Debug, Clone)]
pub struct Transport {
	client: Client,
	config: TransportConfig,
}

impl Transport {
	pub fn new(config: TransportConfig) -> Result<Self, UploadError> {
		let client = loom_common_http::builder()
			.connect_timeout(config.timeout)
			.build()
			.map_err(UploadError::Network)?;
		Ok(Self { client, config })
	}

	pub fn config(&self) -> &TransportConfig {
		&self.config
	}

	/// POSTs the payload produced by `build_payload` to `endpoint`.
	///
	/// A fresh payload is built for every attempt since multipart bodies are
	/// consumed by sending them. Body streams should be wrapped with the given
	/// [`Activity`] so a slow but progressing upload is not timed out.
	pub async fn send<F, Fut>(&self, endpoint: &Url, mut build_payload: F) -> Result<(), UploadError>
	where
		F: FnMut(Activity) -> Fut,
		Fut: Future<Output = Result<Form, UploadError>>,
	{
		retry(&self.config.retry, || {
			let activity = Activity::new();
			let payload = build_payload(activity.clone());
			async move {
				let form = payload.await?;
				self.attempt(endpoint, form, activity).await
			}
		})
		.await
	}

	async fn attempt(&self, endpoint: &Url, form: Form, activity: Activity) -> Result<(), UploadError> {
		activity.touch();
		let exchange = async {
			let response = self
				.client
				.post(endpoint.clone())
				.multipart(form)
				.send()
				.await
				.map_err(UploadError::Network)?;
			activity.touch();
			let status = response.status();
			let body = response.text().await.map_err(UploadError::Network)?;
			Ok::<_, UploadError>((status, body))
		};

		let (status, body) = tokio::select! {
			result = exchange => result?,
			() = activity.stalled(self.config.timeout) => {
				return Err(UploadError::TimedOut(self.config.timeout));
			}
		};

		debug!(status = status.as_u16(), "upload API responded");
		classify_response(status, &body)
	}
}

#[derive(Deserialize)]
struct ErrorDocument {
	errors: Vec<String>,
}

/// Maps an upload API response to success or a typed error.
pub fn classify_response(status: StatusCode, body: &str) -> Result<(), UploadError> {
	match status {
		StatusCode::OK => Ok(()),
		StatusCode::BAD_REQUEST => match serde_json::from_str::<ErrorDocument>(body) {
			Ok(document) => Err(UploadError::InvalidPayload {
				errors: document.errors,
			}),
			Err(_) => Err(UploadError::BadRequest {
				body: body.to_string(),
			}),
		},
		status => Err(UploadError::Status { status }),
	}
}
