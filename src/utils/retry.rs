//! Bounded, fixed-interval retries for idempotent read calls.
//!
//! Submissions never go through here: a retried broadcast can double-send.

use backoff::backoff::Backoff;
use backoff::future::retry;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Errors that know whether repeating the call can help.
pub trait Retryable {
	fn is_transient(&self) -> bool;
}

/// Retry budget for read calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
	/// Total attempts, including the first one.
	pub attempts: u32,
	/// Pause between attempts.
	pub interval: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			attempts: 5,
			interval: Duration::from_secs(1),
		}
	}
}

impl RetryPolicy {
	pub fn new(attempts: u32, interval: Duration) -> Self {
		Self { attempts, interval }
	}

	/// Policy that never retries.
	pub fn none() -> Self {
		Self::new(1, Duration::ZERO)
	}

	fn backoff(&self) -> BoundedConstant {
		BoundedConstant::new(self.interval, self.attempts)
	}

	/// Runs `op` until it succeeds, fails permanently, or the budget is spent.
	pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
	where
		E: Retryable + std::fmt::Display,
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, E>>,
	{
		retry(self.backoff(), || {
			let fut = op();
			async move {
				fut.await.map_err(|e| {
					if e.is_transient() {
						warn!("{} failed, will retry: {}", operation, e);
						backoff::Error::transient(e)
					} else {
						backoff::Error::permanent(e)
					}
				})
			}
		})
		.await
	}
}

/// Constant interval, stops after a fixed number of retries.
struct BoundedConstant {
	interval: Duration,
	attempts: u32,
	remaining: u32,
}

impl BoundedConstant {
	fn new(interval: Duration, attempts: u32) -> Self {
		let remaining = attempts.saturating_sub(1);
		Self {
			interval,
			attempts,
			remaining,
		}
	}
}

impl Backoff for BoundedConstant {
	fn reset(&mut self) {
		self.remaining = self.attempts.saturating_sub(1);
	}

	fn next_backoff(&mut self) -> Option<Duration> {
		if self.remaining == 0 {
			return None;
		}
		self.remaining -= 1;
		Some(self.interval)
	}
}
