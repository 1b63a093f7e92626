//! Private transaction builder
//!
//! This module provides a builder for assembling a `PrivateTxRecord` from the data the ledger
//! prepares, the memo metadata and a proof from a [`ProofProvider`].

use crate::chain::{RpcError, SignerError};
use crate::relayer::RelayerError;
use crate::transaction::codec::{
	CodecError, MemoMetadata, PrivateTxRecord, ProofWords, TRANSACT_SELECTOR, TxType,
	WithdrawDetails, Word, compose_memo,
};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ProofError {
	#[error("Proof generation failed: {0}")]
	Generation(String),

	#[error("Proof rejected by the verifier")]
	Rejected,
}

/// Why a wait for a terminal outcome stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollInterruption {
	TimedOut,
	Cancelled,
	/// The relayer accepted the transaction but gave no job to follow.
	Untracked,
}

impl fmt::Display for PollInterruption {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PollInterruption::TimedOut => write!(f, "timed out"),
			PollInterruption::Cancelled => write!(f, "cancelled"),
			PollInterruption::Untracked => write!(f, "impossible, relayer returned no job"),
		}
	}
}

#[derive(Error, Debug)]
pub enum TransactionError {
	#[error("Proof error: {0}")]
	Proof(#[from] ProofError),

	#[error("Encoding error: {0}")]
	Codec(#[from] CodecError),

	#[error("RPC error: {0}")]
	Rpc(#[from] RpcError),

	#[error("Relayer error: {0}")]
	Relayer(#[from] RelayerError),

	#[error("Signing error: {0}")]
	Signing(#[from] SignerError),

	#[error("Insufficient balance: {0}")]
	InsufficientBalance(String),

	#[error("Allowance error: {0}")]
	Allowance(String),

	#[error("Transaction {0} reverted")]
	Reverted(String),

	/// The transaction may still land; its terminal state was not observed.
	#[error("Outcome of {reference} unknown: wait {cause}")]
	OutcomeUnknown {
		reference: String,
		cause: PollInterruption,
	},

	#[error("Unexpected error: {0}")]
	UnexpectedError(String),
}

/// Public inputs and ciphertext prepared by the ledger for one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionData {
	pub tx_type: TxType,
	pub nullifier: Word,
	pub out_commit: Word,
	pub transfer_index: u64,
	pub energy_amount: u64,
	/// Base units entering (deposit) or leaving (withdraw) the pool, or moved by a transfer.
	pub amount: u64,
	pub root_after: Word,
	pub tree_proof: ProofWords,
	pub ciphertext: Vec<u8>,
}

/// Zero-knowledge prover and verifier for the transact circuit.
#[async_trait::async_trait]
pub trait ProofProvider: Send + Sync {
	async fn prove(&self, data: &TransactionData, memo: &[u8]) -> Result<ProofWords, ProofError>;

	async fn verify(
		&self,
		data: &TransactionData,
		memo: &[u8],
		proof: &ProofWords,
	) -> Result<bool, ProofError>;
}

/// Builder for constructing private transaction records
#[derive(Default)]
pub struct PrivateTxBuilder {
	/// Public inputs and ciphertext from the ledger
	data: Option<TransactionData>,
	/// Fee and, for withdrawals, the recipient
	metadata: Option<MemoMetadata>,
	/// Generates and checks the transact proof
	proof_provider: Option<Arc<dyn ProofProvider>>,
	/// Spendable balance in base units; required for transfers and withdrawals
	available_balance: Option<u64>,
}

impl PrivateTxBuilder {
	/// Creates a new transaction builder
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_transaction_data(mut self, data: TransactionData) -> Self {
		self.data = Some(data);
		self
	}

	pub fn with_memo_metadata(mut self, metadata: MemoMetadata) -> Self {
		self.metadata = Some(metadata);
		self
	}

	/// Sets the proof provider
	pub fn with_proof_provider(mut self, proof_provider: Arc<dyn ProofProvider>) -> Self {
		self.proof_provider = Some(proof_provider);
		self
	}

	pub fn with_available_balance(mut self, balance: u64) -> Self {
		self.available_balance = Some(balance);
		self
	}

	/// Builds the final record. The proof is verified before the record is returned, so a
	/// rejected proof never reaches a submitter.
	pub async fn build(self) -> Result<PrivateTxRecord, TransactionError> {
		let data = self.data.ok_or_else(|| {
			TransactionError::UnexpectedError("Transaction data not set".to_string())
		})?;
		let metadata = self.metadata.ok_or_else(|| {
			TransactionError::UnexpectedError("Memo metadata not set".to_string())
		})?;
		let proof_provider = self.proof_provider.ok_or_else(|| {
			TransactionError::UnexpectedError("Proof provider not set".to_string())
		})?;

		info!("Building {:?} transaction", data.tx_type);

		if matches!(data.tx_type, TxType::Transfer | TxType::Withdraw) {
			let balance = self.available_balance.ok_or_else(|| {
				TransactionError::InsufficientBalance(
					"available balance not provided for a spending transaction".to_string(),
				)
			})?;
			let required = data.amount.checked_add(metadata.fee()).ok_or_else(|| {
				TransactionError::InsufficientBalance("Amount plus fee overflows".to_string())
			})?;
			if balance < required {
				return Err(TransactionError::InsufficientBalance(format!(
					"need {} base units (fee {}), have {}",
					required,
					metadata.fee(),
					balance
				)));
			}
		}

		let token_amount = match data.tx_type {
			TxType::Deposit => data.amount,
			TxType::Transfer => 0,
			TxType::Withdraw => WithdrawDetails::token_amount_slot(data.amount)?,
		};
		let memo = compose_memo(data.tx_type, &metadata, &data.ciphertext)?;

		let transact_proof = proof_provider.prove(&data, &memo).await?;
		if !proof_provider.verify(&data, &memo, &transact_proof).await? {
			return Err(ProofError::Rejected.into());
		}
		debug!("Transact proof verified");

		Ok(PrivateTxRecord {
			selector: TRANSACT_SELECTOR,
			nullifier: data.nullifier,
			out_commit: data.out_commit,
			transfer_index: data.transfer_index,
			energy_amount: data.energy_amount,
			token_amount,
			transact_proof,
			root_after: data.root_after,
			tree_proof: data.tree_proof,
			tx_type: data.tx_type,
			memo,
		})
	}
}
