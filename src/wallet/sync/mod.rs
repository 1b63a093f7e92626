//! Wallet Synchronization Module
//!
//! This module rebuilds a user's private balance by replaying the pool's transaction history.
//! It is composed of several submodules, each responsible for a specific aspect of the sync process:
//!
//! - `orchestrator`: `StateSync`, which runs one pass for an (account, token) pair and commits its checkpoint.
//! - `strategies`: Event scanners reading pool transactions from chain logs or from a relayer.
//! - `transaction_processor`: Decodes raw payloads into records and ciphertexts.
//! - `ledger`: The decryption and tree capabilities a pass consumes.
//! - `repositories`: Checkpoint storage, on disk or in memory.
//! - `progress_tracker`: Per-pass counters and gap detection.
//!
//! A pass either applies its whole batch and advances the checkpoint, or aborts and leaves it
//! where it was; the next pass replays from there.

/// Capability interface of the note/account ledger
pub mod ledger;
/// Main coordinator for a sync pass
pub mod orchestrator;
/// Tracks synchronization progress and statistics
pub mod progress_tracker;
/// Checkpoint storage
pub mod repositories;
/// Event scanners
pub mod strategies;
/// Transaction parsing service
pub mod transaction_processor;

pub use orchestrator::*;
