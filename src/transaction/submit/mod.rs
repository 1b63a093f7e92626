//! Submission strategies for encoded private transactions.
//!
//! [`SubmissionClient`] is chosen at construction time: `Direct` signs and broadcasts through the
//! chain RPC, `Relayed` hands the transaction to a relayer and follows the job until it reaches
//! a terminal state. Both waits are bounded by [`PollConfig`] and can be cancelled, in which
//! case the outcome is reported as unknown rather than failed.

/// Approvals for token deposits
mod allowance;
/// Local signing and broadcast
mod direct;
/// Relayer job submission
mod relayed;

pub use allowance::AllowanceGuard;
pub use direct::{ChainSender, DEFAULT_GAS_MULTIPLIER, DirectSubmitter};
pub use relayed::RelayedSubmitter;

use crate::transaction::builder::{PollInterruption, TransactionError};
use crate::transaction::codec::PrivateTxRecord;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A built record ready to be sent.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
	pub record: PrivateTxRecord,
	/// Signature authorizing the pool to pull a deposit, when the record is one.
	pub deposit_signature: Option<String>,
}

/// Bounds for waiting on a terminal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
	pub interval: Duration,
	pub max_wait: Duration,
}

impl Default for PollConfig {
	fn default() -> Self {
		Self {
			interval: Duration::from_secs(3),
			max_wait: Duration::from_secs(600),
		}
	}
}

/// Calls `check` until it yields a value, fails, or the wait is interrupted.
///
/// The first check runs immediately; later ones are spaced by `poll.interval` and never
/// scheduled past the deadline.
pub(crate) async fn poll_until<T, F, Fut>(
	poll: &PollConfig,
	cancel: &CancellationToken,
	reference: &str,
	mut check: F,
) -> Result<T, TransactionError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<Option<T>, TransactionError>>,
{
	let deadline = Instant::now() + poll.max_wait;
	let interrupted = |cause| TransactionError::OutcomeUnknown {
		reference: reference.to_string(),
		cause,
	};

	loop {
		if cancel.is_cancelled() {
			return Err(interrupted(PollInterruption::Cancelled));
		}
		if let Some(value) = check().await? {
			return Ok(value);
		}

		let now = Instant::now();
		if now >= deadline {
			return Err(interrupted(PollInterruption::TimedOut));
		}
		let wake = (now + poll.interval).min(deadline);
		debug!("{} still pending, next check in {:?}", reference, wake - now);

		tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(interrupted(PollInterruption::Cancelled)),
			_ = tokio::time::sleep_until(wake) => {}
		}
	}
}

/// Direct or relayed submission, selected at construction time.
pub enum SubmissionClient {
	Direct(DirectSubmitter),
	Relayed(RelayedSubmitter),
}

impl SubmissionClient {
	/// Send `request` and wait for its terminal outcome, returning the transaction hash.
	///
	/// Errors always propagate; nothing is retried once the transaction may have been sent.
	pub async fn send_transaction(
		&self,
		request: &SubmitRequest,
		cancel: &CancellationToken,
	) -> Result<String, TransactionError> {
		match self {
			SubmissionClient::Direct(direct) => direct.send_transaction(request, cancel).await,
			SubmissionClient::Relayed(relayed) => relayed.send_transaction(request, cancel).await,
		}
	}

	/// Make sure the pool may pull `amount` of `token` before a deposit is built. Returns the
	/// approval transaction hash when one had to be sent.
	pub async fn ensure_allowance(
		&self,
		token: &str,
		amount: u128,
		cancel: &CancellationToken,
	) -> Result<Option<String>, TransactionError> {
		let guard = match self {
			SubmissionClient::Direct(direct) => Some(direct.allowance()),
			SubmissionClient::Relayed(relayed) => relayed.allowance(),
		};
		match guard {
			Some(guard) => guard.ensure(token, amount, cancel).await,
			None => Err(TransactionError::Allowance(
				"No signer configured for token approvals".to_string(),
			)),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};

	fn poll() -> PollConfig {
		PollConfig {
			interval: Duration::from_secs(3),
			max_wait: Duration::from_secs(10),
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_poll_times_out_at_deadline() {
		let checks = Arc::new(AtomicUsize::new(0));
		let started = Instant::now();
		let counter = checks.clone();

		let result: Result<(), _> = poll_until(&poll(), &CancellationToken::new(), "job-1", || {
			let counter = counter.clone();
			async move {
				counter.fetch_add(1, Ordering::SeqCst);
				Ok::<_, TransactionError>(None)
			}
		})
		.await;

		assert!(matches!(
			result,
			Err(TransactionError::OutcomeUnknown {
				cause: PollInterruption::TimedOut,
				..
			})
		));
		// Checks at 0s, 3s, 6s, 9s and a last one at the 10s deadline.
		assert_eq!(checks.load(Ordering::SeqCst), 5);
		assert_eq!(started.elapsed(), Duration::from_secs(10));
	}

	#[tokio::test(start_paused = true)]
	async fn test_poll_stops_on_cancel() {
		let cancel = CancellationToken::new();
		let trigger = cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_secs(4)).await;
			trigger.cancel();
		});

		let result: Result<(), _> =
			poll_until(&poll(), &cancel, "job-2", || async {
				Ok::<_, TransactionError>(None)
			})
			.await;

		match result {
			Err(TransactionError::OutcomeUnknown { reference, cause }) => {
				assert_eq!(reference, "job-2");
				assert_eq!(cause, PollInterruption::Cancelled);
			}
			other => panic!("unexpected result: {:?}", other),
		}
	}
}
