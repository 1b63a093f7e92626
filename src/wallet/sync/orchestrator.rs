//! Sync pass orchestrator for one (account, token) pair.
//!
//! This module defines `StateSync`, which pulls a batch from an `EventScanner`, decodes every
//! payload, lets the ledger classify the ciphertext and applies the outcome at the running leaf
//! index. The checkpoint is committed only once the whole batch has been applied.
//!
//! A pass moves through `Idle → Fetching → (Decoding → Classifying → Applying)* → Committing →
//! Idle`. An unrecoverable error parks it in `Aborted`; the next call to [`StateSync::sync`]
//! starts over from the last committed checkpoint.

use crate::utils::KeyedLocks;
use crate::wallet::WalletSyncError;
use crate::wallet::sync::{
	ledger::{DecryptOutcome, IndexedNote, Ledger, LedgerError},
	progress_tracker::{RecordOutcome, SyncProgressTracker, SyncStats},
	repositories::CheckpointStore,
	strategies::{EventScanner, ScannedPayload, SyncConfig},
	transaction_processor::TransactionProcessor,
};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Identity of a synchronized balance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyncKey {
	pub account: String,
	pub token: String,
}

impl SyncKey {
	pub fn new(account: impl Into<String>, token: impl Into<String>) -> Self {
		Self {
			account: account.into(),
			token: token.into(),
		}
	}

	/// Key under which the checkpoint is persisted.
	pub fn storage_key(&self) -> String {
		format!("{}:{}", self.account, self.token)
	}
}

impl fmt::Display for SyncKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}/{}", self.account, self.token)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
	Idle,
	Fetching,
	Decoding,
	Classifying,
	Applying,
	Committing,
	Aborted,
}

/// Result of a completed sync pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
	pub key: SyncKey,
	/// Checkpoint the pass started from
	pub start_checkpoint: u64,
	/// Checkpoint persisted at the end of the pass
	pub checkpoint: u64,
	pub start_index: u64,
	/// Leaf index after the last applied record
	pub next_index: u64,
	pub stats: SyncStats,
	/// Head reported by the scanner source, if it offers one
	pub source_head: Option<u64>,
}

/// Drives sync passes for one (account, token) pair.
pub struct StateSync<L: Ledger> {
	key: SyncKey,
	ledger: Arc<L>,
	scanner: Box<dyn EventScanner>,
	checkpoints: Arc<dyn CheckpointStore>,
	locks: KeyedLocks<SyncKey>,
	processor: TransactionProcessor,
	config: SyncConfig,
	phase: watch::Sender<SyncPhase>,
}

impl<L: Ledger> StateSync<L> {
	/// Create a new sync driver.
	///
	/// # Arguments
	///
	/// * `locks` - Lock registry shared by every `StateSync` that may target the same key.
	pub fn new(
		key: SyncKey,
		ledger: Arc<L>,
		scanner: Box<dyn EventScanner>,
		checkpoints: Arc<dyn CheckpointStore>,
		locks: KeyedLocks<SyncKey>,
		config: SyncConfig,
	) -> Self {
		let (phase, _) = watch::channel(SyncPhase::Idle);
		Self {
			key,
			ledger,
			scanner,
			checkpoints,
			locks,
			processor: TransactionProcessor::new(),
			config,
			phase,
		}
	}

	pub fn key(&self) -> &SyncKey {
		&self.key
	}

	/// Watch the phase of the running pass.
	pub fn subscribe_phase(&self) -> watch::Receiver<SyncPhase> {
		self.phase.subscribe()
	}

	fn set_phase(&self, phase: SyncPhase) {
		self.phase.send_replace(phase);
	}

	/// Run one sync pass. Waits for any other pass on the same key to finish first.
	pub async fn sync(&self) -> Result<SyncReport, WalletSyncError> {
		let _guard = self.locks.acquire(&self.key).await;

		match self.run_pass().await {
			Ok(report) => {
				self.set_phase(SyncPhase::Idle);
				Ok(report)
			}
			Err(e) => {
				self.set_phase(SyncPhase::Aborted);
				error!("Sync pass for {} aborted: {}", self.key, e);
				Err(e)
			}
		}
	}

	async fn run_pass(&self) -> Result<SyncReport, WalletSyncError> {
		let storage_key = self.key.storage_key();
		let start_checkpoint = self.checkpoints.load(&storage_key).await?.unwrap_or(0);
		let start_index = self.ledger.next_tree_index().await?;

		info!(
			"Starting sync for {} with {} from checkpoint {} at leaf index {}",
			self.key,
			self.scanner.name(),
			start_checkpoint,
			start_index
		);

		self.set_phase(SyncPhase::Fetching);
		let source_head = match self.scanner.head_hint().await {
			Ok(head) => head,
			Err(e) => {
				warn!("Could not read source head for {}: {}", self.key, e);
				None
			}
		};
		let batch = self.scanner.fetch(start_checkpoint).await?;
		debug!(
			"Fetched {} payloads for {}, next checkpoint {}",
			batch.payloads.len(),
			self.key,
			batch.next_checkpoint
		);

		let mut tracker = SyncProgressTracker::new(start_checkpoint)
			.with_gap_detection(self.scanner.dense_positions());
		let mut idx = start_index;

		for payload in &batch.payloads {
			let (outcome, notes) = self.apply_payload(payload, idx).await?;
			tracker.record(payload.position, outcome, notes);
			// Every pool transaction owns STEP leaves, including ones we cannot read.
			idx += self.config.leaf_step;
		}

		self.set_phase(SyncPhase::Committing);
		if idx > start_index {
			self.ledger.commit_tree_index(idx).await?;
		}
		let checkpoint = if batch.next_checkpoint > start_checkpoint {
			self.checkpoints
				.save(&storage_key, batch.next_checkpoint)
				.await?;
			batch.next_checkpoint
		} else {
			start_checkpoint
		};

		let stats = tracker.get_stats();
		info!("{}", stats.summary());

		Ok(SyncReport {
			key: self.key.clone(),
			start_checkpoint,
			checkpoint,
			start_index,
			next_index: idx,
			stats,
			source_head,
		})
	}

	/// Decode, classify and apply one payload at `idx`.
	///
	/// Returns the outcome and the number of notes stored. Undecodable payloads and ciphertexts
	/// the ledger cannot decrypt are reported as `Skipped`; any other error aborts the pass.
	async fn apply_payload(
		&self,
		payload: &ScannedPayload,
		idx: u64,
	) -> Result<(RecordOutcome, usize), WalletSyncError> {
		self.set_phase(SyncPhase::Decoding);
		let processed = match self.processor.process_transaction(payload) {
			Ok(processed) => processed,
			Err(e) => {
				warn!(
					"Skipping payload at position {} (leaves {}..): {}",
					payload.position, idx, e
				);
				return Ok((RecordOutcome::Skipped, 0));
			}
		};
		if let Some(withdraw) = &processed.withdraw {
			debug!(
				"Withdrawal at position {}: {} to 0x{} (fee {})",
				processed.position,
				withdraw.amount,
				hex::encode(withdraw.recipient),
				withdraw.fee
			);
		}

		self.set_phase(SyncPhase::Classifying);
		let classification = match self.ledger.classify(&processed.ciphertext).await {
			Ok(classification) => classification,
			Err(LedgerError::Decrypt(reason)) => {
				warn!(
					"Skipping undecodable ciphertext at position {} (leaves {}..): {}",
					payload.position, idx, reason
				);
				return Ok((RecordOutcome::Skipped, 0));
			}
			Err(e) => return Err(e.into()),
		};

		self.set_phase(SyncPhase::Applying);
		let hashes = classification.hashes;
		match classification.outcome {
			DecryptOutcome::Account { account, notes } => {
				let notes: Vec<_> = notes
					.into_iter()
					.enumerate()
					.map(|(i, note)| IndexedNote {
						index: idx + 1 + i as u64,
						note,
					})
					.collect();
				let count = notes.len();
				self.ledger.add_account(idx, &hashes, account, notes).await?;
				Ok((RecordOutcome::Account, count))
			}
			DecryptOutcome::NotesOnly(notes) if !notes.is_empty() => {
				let notes: Vec<_> = notes
					.into_iter()
					.map(|n| IndexedNote {
						index: idx + 1 + n.slot,
						note: n.note,
					})
					.collect();
				let count = notes.len();
				self.ledger.add_notes(idx, &hashes, notes).await?;
				Ok((RecordOutcome::Notes, count))
			}
			DecryptOutcome::NotesOnly(_) | DecryptOutcome::None => {
				self.ledger.add_hashes(idx, &hashes).await?;
				Ok((RecordOutcome::HashesOnly, 0))
			}
		}
	}

	/// Spendable balance reported by the ledger, in base units.
	pub async fn balance(&self) -> Result<String, WalletSyncError> {
		Ok(self.ledger.total_balance().await?)
	}
}
