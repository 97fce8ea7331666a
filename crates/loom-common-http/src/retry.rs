// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Bounded retry with fixed or exponential backoff for HTTP requests.

use reqwest::StatusCode;
use std::time::Duration;
use tracing::warn;

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
	/// Wait `base_delay` between every attempt.
	Fixed,
	/// Multiply `base_delay` by `factor` for every attempt already made.
	Exponential { factor: f64 },
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub backoff: Backoff,
	pub jitter: bool,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self::fixed(5, Duration::from_secs(1))
	}
}

impl RetryConfig {
	/// Constant interval between attempts, no jitter.
	pub fn fixed(max_attempts: u32, interval: Duration) -> Self {
		Self {
			max_attempts,
			base_delay: interval,
			max_delay: interval,
			backoff: Backoff::Fixed,
			jitter: false,
		}
	}

	/// Doubling delay starting at `base_delay`, capped at `max_delay`, with jitter.
	pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
		Self {
			max_attempts,
			base_delay,
			max_delay,
			backoff: Backoff::Exponential { factor: 2.0 },
			jitter: true,
		}
	}
}

pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

/// Whether a non-success HTTP status is worth another attempt.
///
/// Anything outside the 4xx range is transient, as are 408 and 429.
pub fn is_retryable_status(status: StatusCode) -> bool {
	!status.is_client_error()
		|| status == StatusCode::REQUEST_TIMEOUT
		|| status == StatusCode::TOO_MANY_REQUESTS
}

impl RetryableError for reqwest::Error {
	fn is_retryable(&self) -> bool {
		// A request that could not even be constructed will fail the same way again.
		if self.is_builder() {
			return false;
		}

		if let Some(status) = self.status() {
			return is_retryable_status(status);
		}

		true
	}
}

fn calculate_delay(cfg: &RetryConfig, attempt: u32) -> Duration {
	let base = cfg.base_delay.as_secs_f64();
	let raw_delay = match cfg.backoff {
		Backoff::Fixed => base,
		Backoff::Exponential { factor } => base * factor.powi(attempt as i32),
	};
	let capped_delay = raw_delay.min(cfg.max_delay.as_secs_f64().max(base));

	let final_delay = if cfg.jitter {
		let jitter_factor = 0.5 + fastrand::f64();
		capped_delay * jitter_factor
	} else {
		capped_delay
	};

	Duration::from_secs_f64(final_delay)
}

/// Runs `f` until it succeeds, returns a non-retryable error, or
/// `max_attempts` calls have been made. The last error is returned when the
/// attempts run out.
pub async fn retry<F, Fut, T, E>(cfg: &RetryConfig, mut f: F) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: std::future::Future<Output = Result<T, E>>,
	E: RetryableError + std::fmt::Display,
{
	let max_attempts = cfg.max_attempts.max(1);
	let mut attempt = 0;

	loop {
		match f().await {
			Ok(result) => return Ok(result),
			Err(err) => {
				attempt += 1;

				if !err.is_retryable() {
					warn!(
							error = %err,
							attempt = attempt,
							"non-retryable error encountered"
					);
					return Err(err);
				}

				if attempt >= max_attempts {
					warn!(
							error = %err,
							attempt = attempt,
							max_attempts = max_attempts,
							"max retry attempts exhausted"
					);
					return Err(err);
				}

				let delay = calculate_delay(cfg, attempt - 1);
				warn!(
						error = %err,
						attempt = attempt,
						max_attempts = max_attempts,
						delay_ms = delay.as_millis() as u64,
						"retrying after error"
				);

				tokio::time::sleep(delay).await;
			}
		}
	}
}
