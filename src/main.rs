use shielded_state_sync::chain::{JsonRpcClient, RpcError};
use shielded_state_sync::relayer::{HttpRelayerClient, RelayerApi, RelayerError};
use shielded_state_sync::settings::{Settings, SettingsError};
use shielded_state_sync::transaction::POOL_DECIMALS;
use shielded_state_sync::utils::format_token_amount;
use shielded_state_sync::wallet::WalletSyncError;
use shielded_state_sync::wallet::sync::repositories::{CheckpointStore, FileCheckpointStore};
use shielded_state_sync::wallet::sync::strategies::{EventScanner, OnChainScanner, RelayerScanner};
use shielded_state_sync::wallet::sync::transaction_processor::TransactionProcessor;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info};

#[derive(Debug, thiserror::Error)]
enum OperatorError {
	#[error(transparent)]
	Settings(#[from] SettingsError),

	#[error(transparent)]
	Sync(#[from] WalletSyncError),

	#[error(transparent)]
	Relayer(#[from] RelayerError),

	#[error(transparent)]
	Rpc(#[from] RpcError),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	if let Err(e) = run().await {
		error!("{}", e);
		std::process::exit(1);
	}
}

/// Decode the pool transactions after the stored checkpoint and summarise them. The checkpoint
/// itself is left alone; it belongs to the sync pass that applies the records to a ledger.
async fn run() -> Result<(), OperatorError> {
	let settings = Settings::load()?;
	let key = settings.sync_key();
	info!("Inspecting pool transactions for {}", key);

	let checkpoints = FileCheckpointStore::new(settings.data_dir.clone());
	let checkpoint = checkpoints
		.load(&key.storage_key())
		.await?
		.unwrap_or(0);

	let scanner: Box<dyn EventScanner> = if let Some(url) = &settings.relayer_url {
		let relayer = Arc::new(HttpRelayerClient::new(url.clone())?);
		let info = relayer.info().await?;
		info!(
			"Relayer root {} with optimistic index {}",
			info.root, info.delta_index
		);
		Box::new(RelayerScanner::new(relayer, settings.sync_config()))
	} else if let Some(url) = &settings.rpc_url {
		let rpc = Arc::new(JsonRpcClient::new(url.clone())?);
		Box::new(OnChainScanner::new(
			rpc,
			settings.require_pool_address()?.to_string(),
			settings.message_topic.clone(),
			settings.sync_config(),
		))
	} else {
		return Err(SettingsError::Missing("relayer_url or rpc_url").into());
	};

	info!("Fetching with {} from checkpoint {}", scanner.name(), checkpoint);
	let batch = scanner.fetch(checkpoint).await?;

	let processor = TransactionProcessor::new();
	let (records, skipped) = processor.process_transactions_batch(&batch.payloads);

	let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
	let mut memo_bytes = 0usize;
	for record in &records {
		*by_type
			.entry(format!("{:?}", record.record.tx_type))
			.or_default() += 1;
		memo_bytes += record.record.memo.len();
		debug!(
			"Position {}: {:?}, memo {} bytes, ciphertext {} bytes",
			record.position,
			record.record.tx_type,
			record.record.memo.len(),
			record.ciphertext.len()
		);
		if let Some(withdraw) = &record.withdraw {
			info!(
				"Withdrawal of {} to 0x{} at position {}",
				format_token_amount(u128::from(withdraw.amount.unsigned_abs()), POOL_DECIMALS),
				hex::encode(withdraw.recipient),
				record.position
			);
		}
	}

	info!(
		"Decoded {} of {} payloads ({} skipped), {:?}, {} memo bytes, next checkpoint {}",
		records.len(),
		batch.payloads.len(),
		skipped,
		by_type,
		memo_bytes,
		batch.next_checkpoint
	);
	Ok(())
}
