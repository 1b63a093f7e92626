use crate::relayer::{JobState, RelayerApi, RelayerError, RelayerTxRequest};
use crate::transaction::builder::{PollInterruption, TransactionError};
use crate::transaction::submit::{AllowanceGuard, PollConfig, SubmitRequest, poll_until};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Submits records through a relayer and follows the resulting job.
pub struct RelayedSubmitter {
	relayer: Arc<dyn RelayerApi>,
	poll: PollConfig,
	/// Present when a local key can approve token deposits
	allowance: Option<AllowanceGuard>,
}

impl RelayedSubmitter {
	pub fn new(relayer: Arc<dyn RelayerApi>, poll: PollConfig) -> Self {
		Self {
			relayer,
			poll,
			allowance: None,
		}
	}

	pub fn with_allowance_guard(mut self, guard: AllowanceGuard) -> Self {
		self.allowance = Some(guard);
		self
	}

	pub fn allowance(&self) -> Option<&AllowanceGuard> {
		self.allowance.as_ref()
	}

	/// POST the record, then poll its job until `completed` (the transaction hash is returned),
	/// `failed` or not found.
	pub async fn send_transaction(
		&self,
		request: &SubmitRequest,
		cancel: &CancellationToken,
	) -> Result<String, TransactionError> {
		let body = RelayerTxRequest::from_record(&request.record, request.deposit_signature.clone());
		let Some(job_id) = self.relayer.submit_transaction(&body).await? else {
			let reference = body.proof.inputs.first().cloned().unwrap_or_default();
			warn!(
				"Relayer accepted {:?} transaction with nullifier {} but returned no job",
				request.record.tx_type, reference
			);
			return Err(TransactionError::OutcomeUnknown {
				reference,
				cause: PollInterruption::Untracked,
			});
		};
		info!(
			"Relayer accepted {:?} transaction as job {}",
			request.record.tx_type, job_id
		);

		let relayer = self.relayer.as_ref();
		let id = job_id.as_str();
		let tx_hash = poll_until(&self.poll, cancel, id, move || check_job(relayer, id)).await?;

		info!("Job {} completed with transaction {}", job_id, tx_hash);
		Ok(tx_hash)
	}
}

/// One status check: `Some(hash)` once completed, `None` while queued.
async fn check_job(relayer: &dyn RelayerApi, id: &str) -> Result<Option<String>, TransactionError> {
	let status = relayer
		.job_status(id)
		.await?
		.ok_or_else(|| RelayerError::JobNotFound(id.to_string()))?;

	match status.state {
		JobState::Queued => Ok(None),
		JobState::Completed => match status.tx_hash {
			Some(hash) => Ok(Some(hash)),
			None => Err(RelayerError::MissingTxHash(id.to_string()).into()),
		},
		JobState::Failed => Err(RelayerError::JobFailed {
			job_id: id.to_string(),
			reason: status
				.failed_reason
				.unwrap_or_else(|| "no reason given".to_string()),
		}
		.into()),
		JobState::Unknown => Err(RelayerError::UnknownJobState(id.to_string()).into()),
	}
}
