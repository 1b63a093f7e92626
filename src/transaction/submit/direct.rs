use crate::chain::{CallRequest, ChainRpc, TransactionReceipt, TransactionSigner, UnsignedTransaction};
use crate::transaction::builder::TransactionError;
use crate::transaction::codec;
use crate::transaction::submit::{AllowanceGuard, PollConfig, SubmitRequest, poll_until};
use crate::utils::{KeyedLocks, RetryPolicy};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Headroom applied to gas estimates.
pub const DEFAULT_GAS_MULTIPLIER: u64 = 2;

/// Signs and broadcasts calls from one key, one at a time.
pub struct ChainSender {
	rpc: Arc<dyn ChainRpc>,
	signer: Arc<dyn TransactionSigner>,
	/// Shared with every sender that may use the same key
	locks: KeyedLocks<String>,
	retry: RetryPolicy,
	gas_multiplier: u64,
	poll: PollConfig,
}

impl ChainSender {
	pub fn new(
		rpc: Arc<dyn ChainRpc>,
		signer: Arc<dyn TransactionSigner>,
		locks: KeyedLocks<String>,
		retry: RetryPolicy,
		poll: PollConfig,
	) -> Self {
		Self {
			rpc,
			signer,
			locks,
			retry,
			gas_multiplier: DEFAULT_GAS_MULTIPLIER,
			poll,
		}
	}

	pub fn with_gas_multiplier(mut self, gas_multiplier: u64) -> Self {
		self.gas_multiplier = gas_multiplier.max(1);
		self
	}

	pub fn address(&self) -> &str {
		self.signer.address()
	}

	pub fn rpc(&self) -> &Arc<dyn ChainRpc> {
		&self.rpc
	}

	pub fn retry(&self) -> &RetryPolicy {
		&self.retry
	}

	/// Sign and broadcast a call to `to`, then wait for its receipt.
	///
	/// The signing key stays locked from the nonce read until the receipt arrives. Reads are
	/// retried; the broadcast is not.
	///
	/// # Arguments
	///
	/// * `to` - Contract receiving the call.
	/// * `data` - `0x` calldata.
	/// * `cancel` - Stops the receipt wait; the transaction may still be mined.
	pub async fn send_call(
		&self,
		to: &str,
		data: String,
		cancel: &CancellationToken,
	) -> Result<TransactionReceipt, TransactionError> {
		let from = self.signer.address();
		let _guard = self.locks.acquire(&from.to_lowercase()).await;

		let rpc = self.rpc.as_ref();
		let call = CallRequest {
			from: from.to_string(),
			to: to.to_string(),
			data,
			value: 0,
		};
		let call_ref = &call;

		let estimate = self
			.retry
			.run("eth_estimateGas", move || rpc.estimate_gas(call_ref))
			.await?;
		let gas_limit = estimate.saturating_mul(self.gas_multiplier);
		let gas_price = self.retry.run("eth_gasPrice", move || rpc.gas_price()).await?;
		let nonce = self
			.retry
			.run("eth_getTransactionCount", move || rpc.nonce(from))
			.await?;
		let chain_id = self.retry.run("eth_chainId", move || rpc.chain_id()).await?;

		debug!(
			"Gas estimate {} for call to {}, submitting with limit {}",
			estimate, to, gas_limit
		);

		let tx = UnsignedTransaction {
			chain_id,
			nonce,
			to: call.to,
			data: call.data,
			value: call.value,
			gas_limit,
			gas_price,
		};
		let raw = self.signer.sign(&tx)?;
		let tx_hash = self.rpc.send_raw_transaction(&raw).await?;
		info!("Broadcast transaction {} with nonce {}", tx_hash, nonce);

		let retry = &self.retry;
		let hash = tx_hash.as_str();
		let receipt = poll_until(&self.poll, cancel, hash, move || async move {
			retry
				.run("eth_getTransactionReceipt", move || rpc.transaction_receipt(hash))
				.await
				.map_err(TransactionError::from)
		})
		.await?;

		if !receipt.success {
			return Err(TransactionError::Reverted(receipt.transaction_hash));
		}
		info!(
			"Transaction {} confirmed in block {}",
			receipt.transaction_hash, receipt.block_number
		);
		Ok(receipt)
	}
}

/// Submits records as `transact()` calls signed with the local key.
pub struct DirectSubmitter {
	sender: Arc<ChainSender>,
	pool_address: String,
	allowance: AllowanceGuard,
}

impl DirectSubmitter {
	pub fn new(sender: Arc<ChainSender>, pool_address: String) -> Self {
		let allowance = AllowanceGuard::new(sender.clone(), pool_address.clone());
		Self {
			sender,
			pool_address,
			allowance,
		}
	}

	pub fn allowance(&self) -> &AllowanceGuard {
		&self.allowance
	}

	pub async fn send_transaction(
		&self,
		request: &SubmitRequest,
		cancel: &CancellationToken,
	) -> Result<String, TransactionError> {
		let data = codec::encode(&request.record)?;
		info!(
			"Sending {:?} transaction directly to pool {}",
			request.record.tx_type, self.pool_address
		);
		let receipt = self.sender.send_call(&self.pool_address, data, cancel).await?;
		Ok(receipt.transaction_hash)
	}
}
