//! Progress tracking for a sync pass.
//!
//! This module provides the `SyncProgressTracker`, which records how each scanned record was
//! classified, which chain positions were seen, and summarises the pass once it finishes.

use std::collections::BTreeSet;
use tracing::info;

/// How a scanned record was applied to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
	Account,
	Notes,
	HashesOnly,
	Skipped,
}

/// Service for tracking synchronization progress
#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
	/// Checkpoint the pass started from
	start_position: u64,
	/// Every chain position seen in this pass
	positions: BTreeSet<u64>,
	accounts: usize,
	note_groups: usize,
	notes: usize,
	hashes_only: usize,
	skipped: usize,
	/// Positions are consecutive (relayer offsets), so holes mean missed records
	dense_positions: bool,
	/// Number of records between progress log lines
	log_every: usize,
}

impl SyncProgressTracker {
	pub fn new(start_position: u64) -> Self {
		Self {
			start_position,
			positions: BTreeSet::new(),
			accounts: 0,
			note_groups: 0,
			notes: 0,
			hashes_only: 0,
			skipped: 0,
			dense_positions: false,
			log_every: 1000,
		}
	}

	/// Report gaps between positions. Only meaningful for dense sources; block numbers are sparse.
	pub fn with_gap_detection(mut self, dense_positions: bool) -> Self {
		self.dense_positions = dense_positions;
		self
	}

	/// Record a record at `position` and how it was applied. `notes` is the number of notes
	/// added to the ledger for it.
	pub fn record(&mut self, position: u64, outcome: RecordOutcome, notes: usize) {
		self.positions.insert(position);
		match outcome {
			RecordOutcome::Account => self.accounts += 1,
			RecordOutcome::Notes => self.note_groups += 1,
			RecordOutcome::HashesOnly => self.hashes_only += 1,
			RecordOutcome::Skipped => self.skipped += 1,
		}
		self.notes += notes;

		let seen = self.records_seen();
		if seen % self.log_every == 0 {
			info!(
				"Sync progress: {} records seen, up to position {}",
				seen,
				self.positions.last().copied().unwrap_or(self.start_position)
			);
		}
	}

	fn records_seen(&self) -> usize {
		self.accounts + self.note_groups + self.hashes_only + self.skipped
	}

	/// Missing ranges between the positions seen so far.
	pub fn check_for_gaps(&self) -> Vec<(u64, u64)> {
		let sorted: Vec<u64> = self.positions.iter().copied().collect();
		sorted
			.windows(2)
			.filter(|w| w[1] - w[0] > 1)
			.map(|w| (w[0], w[1]))
			.collect()
	}

	pub fn get_stats(&self) -> SyncStats {
		SyncStats {
			start_position: self.start_position,
			highest_position: self.positions.last().copied(),
			accounts: self.accounts,
			note_groups: self.note_groups,
			notes: self.notes,
			hashes_only: self.hashes_only,
			skipped: self.skipped,
			gaps: if self.dense_positions {
				self.check_for_gaps()
			} else {
				Vec::new()
			},
		}
	}
}

/// Statistics about a sync pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStats {
	pub start_position: u64,
	pub highest_position: Option<u64>,
	pub accounts: usize,
	pub note_groups: usize,
	pub notes: usize,
	pub hashes_only: usize,
	pub skipped: usize,
	pub gaps: Vec<(u64, u64)>,
}

impl SyncStats {
	/// Records applied to the ledger, skipped ones excluded.
	pub fn applied(&self) -> usize {
		self.accounts + self.note_groups + self.hashes_only
	}

	/// Get a human-readable summary of the sync statistics
	pub fn summary(&self) -> String {
		format!(
			"Sync from {} to {}: {} applied ({} accounts, {} note groups with {} notes, {} foreign), {} skipped{}",
			self.start_position,
			self.highest_position
				.map(|p| p.to_string())
				.unwrap_or_else(|| "-".to_string()),
			self.applied(),
			self.accounts,
			self.note_groups,
			self.notes,
			self.hashes_only,
			self.skipped,
			if self.gaps.is_empty() {
				String::new()
			} else {
				format!(" ({} gaps)", self.gaps.len())
			}
		)
	}
}
