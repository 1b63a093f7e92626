//! Capability interface of the note/account ledger.
//!
//! The ledger owns decryption, the local commitment tree and balance accounting. A sync pass
//! only asks it to classify a ciphertext and to record the result at a leaf index. Every
//! `add_*` call must be idempotent for a given index: an aborted pass is replayed from the last
//! committed checkpoint and will hand the same records to the ledger again.
//!
//! Entries written during a pass stay provisional until the pass calls
//! [`Ledger::commit_tree_index`]. `next_tree_index` keeps reporting the last committed value, so
//! a replay lands on the same leaves as the aborted pass did.

use crate::transaction::codec::Word;
use async_trait::async_trait;
use std::fmt::Debug;

/// A note decrypted from an output slot of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotNote<N> {
	/// Output slot within the transaction, starting at 0 for the first note.
	pub slot: u64,
	pub note: N,
}

/// A note placed at its absolute leaf index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedNote<N> {
	pub index: u64,
	pub note: N,
}

/// Result of trying the user's keys against one ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptOutcome<A, N> {
	/// The account slot decrypted; the user authored this transaction.
	Account { account: A, notes: Vec<N> },
	/// Only incoming notes decrypted.
	NotesOnly(Vec<SlotNote<N>>),
	/// Nothing in this transaction belongs to the user.
	None,
}

/// Output commitments of a transaction together with what decrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification<A, N> {
	pub hashes: Vec<Word>,
	pub outcome: DecryptOutcome<A, N>,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
	/// The ciphertext could not be parsed or decrypted; the record is skipped.
	#[error("Decryption failed: {0}")]
	Decrypt(String),

	/// Persisting ledger state failed; the pass is aborted.
	#[error("Ledger storage error: {0}")]
	Storage(String),
}

/// Ledger operations consumed by a sync pass.
#[async_trait]
pub trait Ledger: Send + Sync {
	type Account: Debug + Send + Sync;
	type Note: Debug + Send + Sync;

	/// Tries account decryption first, then note decryption.
	async fn classify(
		&self,
		ciphertext: &[u8],
	) -> Result<Classification<Self::Account, Self::Note>, LedgerError>;

	async fn add_account(
		&self,
		index: u64,
		hashes: &[Word],
		account: Self::Account,
		notes: Vec<IndexedNote<Self::Note>>,
	) -> Result<(), LedgerError>;

	async fn add_notes(
		&self,
		index: u64,
		hashes: &[Word],
		notes: Vec<IndexedNote<Self::Note>>,
	) -> Result<(), LedgerError>;

	async fn add_hashes(&self, index: u64, hashes: &[Word]) -> Result<(), LedgerError>;

	/// First free leaf index of the local tree, as of the last commit.
	async fn next_tree_index(&self) -> Result<u64, LedgerError>;

	/// Make the entries below `next_index` permanent.
	async fn commit_tree_index(&self, next_index: u64) -> Result<(), LedgerError>;

	/// Spendable balance as a decimal string of base units.
	async fn total_balance(&self) -> Result<String, LedgerError>;
}
