use crate::chain::RpcError;
use crate::relayer::RelayerError;
use crate::transaction::codec::CodecError;
use crate::wallet::sync::ledger::LedgerError;

/// Errors raised by a sync pass.
///
/// Per-record `ParseError`s and ledger decryption failures are absorbed by the pass (the record
/// is skipped); every other variant aborts it without touching the checkpoint.
#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum WalletSyncError {
	#[error("Relayer error: {0}")]
	RelayerError(#[from] RelayerError),

	#[error("RPC error: {0}")]
	RpcError(#[from] RpcError),

	#[error("Transaction parse error: {0}")]
	ParseError(#[from] CodecError),

	#[error("Ledger error: {0}")]
	LedgerError(#[from] LedgerError),

	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("Checkpoint error: {0}")]
	CheckpointError(String),
}
