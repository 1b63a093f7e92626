use crate::chain::encode_increase_allowance;
use crate::transaction::builder::TransactionError;
use crate::transaction::submit::ChainSender;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Tops up the pool's token allowance before a deposit.
pub struct AllowanceGuard {
	sender: Arc<ChainSender>,
	spender: String,
}

impl AllowanceGuard {
	pub fn new(sender: Arc<ChainSender>, spender: String) -> Self {
		Self { sender, spender }
	}

	async fn current(&self, token: &str) -> Result<u128, TransactionError> {
		let rpc = self.sender.rpc().as_ref();
		let owner = self.sender.address();
		let spender = self.spender.as_str();
		Ok(self
			.sender
			.retry()
			.run("allowance", move || rpc.allowance(token, owner, spender))
			.await?)
	}

	/// Approve exactly the missing part of `amount`, if any. Returns the approval hash when a
	/// transaction was sent.
	pub async fn ensure(
		&self,
		token: &str,
		amount: u128,
		cancel: &CancellationToken,
	) -> Result<Option<String>, TransactionError> {
		let current = self.current(token).await?;
		if current >= amount {
			debug!(
				"Allowance {} of {} already covers {}",
				current, token, amount
			);
			return Ok(None);
		}

		let delta = amount - current;
		info!(
			"Increasing allowance of {} for {} by {}",
			token, self.spender, delta
		);
		let data = encode_increase_allowance(&self.spender, delta)?;
		let receipt = match self.sender.send_call(token, data, cancel).await {
			Ok(receipt) => receipt,
			Err(TransactionError::Reverted(hash)) => {
				return Err(TransactionError::Allowance(format!(
					"increaseAllowance {} reverted",
					hash
				)));
			}
			Err(e) => return Err(e),
		};

		let updated = self.current(token).await?;
		if updated < amount {
			return Err(TransactionError::Allowance(format!(
				"allowance is {} after approval, {} required",
				updated, amount
			)));
		}
		Ok(Some(receipt.transaction_hash))
	}
}
