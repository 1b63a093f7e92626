use crate::chain::{ChainRpc, LogFilter};
use crate::relayer::RelayerApi;
use crate::utils::RetryPolicy;
use crate::wallet::WalletSyncError;
use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// A raw record and the chain position it was found at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedPayload {
	/// Block number for on-chain scans, log offset for relayer scans.
	pub position: u64,
	/// Hex wire record.
	pub payload: String,
}

/// An ordered window of payloads and the checkpoint that follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanBatch {
	pub payloads: Vec<ScannedPayload>,
	/// Checkpoint to persist once every payload of the batch has been applied.
	pub next_checkpoint: u64,
}

impl ScanBatch {
	pub fn empty(checkpoint: u64) -> Self {
		Self {
			payloads: Vec::new(),
			next_checkpoint: checkpoint,
		}
	}
}

/// Source of pool transactions for a sync pass
#[async_trait::async_trait]
pub trait EventScanner: Send + Sync {
	/// Fetch the payloads after `checkpoint`, in ascending position order.
	async fn fetch(&self, checkpoint: u64) -> Result<ScanBatch, WalletSyncError>;

	/// Optimistic head position, when the source can report one.
	async fn head_hint(&self) -> Result<Option<u64>, WalletSyncError> {
		Ok(None)
	}

	/// Whether positions are consecutive, so a hole between two of them means a missed record.
	fn dense_positions(&self) -> bool {
		false
	}

	/// Get the name of this scanner
	fn name(&self) -> &'static str;
}

/// Configuration for scanners and sync passes
#[derive(Debug, Clone)]
pub struct SyncConfig {
	/// Records requested per relayer page
	pub page_size: u64,
	/// Upper bound on relayer pages fetched in one pass
	pub max_pages: usize,
	/// Upper bound on the block span of one on-chain pass; `None` scans up to the head
	pub max_block_range: Option<u64>,
	/// Leaves occupied by one transaction in the commitment tree
	pub leaf_step: u64,
	/// Retry budget for read calls
	pub retry: RetryPolicy,
}

/// Output slots per transaction, account slot included.
pub const DEFAULT_LEAF_STEP: u64 = 128;

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			page_size: 100,
			max_pages: 50,
			max_block_range: None,
			leaf_step: DEFAULT_LEAF_STEP,
			retry: RetryPolicy::default(),
		}
	}
}

/// Scanner reading pool `Message` logs straight from the chain
pub struct OnChainScanner {
	rpc: Arc<dyn ChainRpc>,
	pool_address: String,
	message_topic: String,
	config: SyncConfig,
}

impl OnChainScanner {
	pub fn new(
		rpc: Arc<dyn ChainRpc>,
		pool_address: String,
		message_topic: String,
		config: SyncConfig,
	) -> Self {
		Self {
			rpc,
			pool_address,
			message_topic,
			config,
		}
	}
}

#[async_trait::async_trait]
impl EventScanner for OnChainScanner {
	async fn fetch(&self, checkpoint: u64) -> Result<ScanBatch, WalletSyncError> {
		let rpc = self.rpc.as_ref();
		let retry = &self.config.retry;

		let head = retry.run("eth_blockNumber", move || rpc.block_number()).await?;
		// Some providers always report the latest event; an unchanged head means no new range.
		if head <= checkpoint {
			debug!("Chain head {} not past checkpoint {}", head, checkpoint);
			return Ok(ScanBatch::empty(checkpoint));
		}

		let to_block = match self.config.max_block_range {
			Some(range) if range > 0 => head.min(checkpoint.saturating_add(range)),
			_ => head,
		};
		let filter = LogFilter {
			address: self.pool_address.clone(),
			topic: self.message_topic.clone(),
			from_block: checkpoint + 1,
			to_block,
		};
		let filter = &filter;
		let logs = retry.run("eth_getLogs", move || rpc.get_logs(filter)).await?;

		info!(
			"Found {} pool events in blocks {}..={}",
			logs.len(),
			filter.from_block,
			filter.to_block
		);

		// A transaction emitting several messages is still one record.
		let mut seen = HashSet::new();
		let unique: Vec<_> = logs
			.iter()
			.filter(|log| seen.insert(log.transaction_hash.as_str()))
			.collect();

		let inputs = try_join_all(unique.iter().map(|log| {
			let hash = log.transaction_hash.as_str();
			retry.run("eth_getTransactionByHash", move || rpc.transaction_input(hash))
		}))
		.await?;

		let payloads = unique
			.iter()
			.zip(inputs)
			.map(|(log, payload)| ScannedPayload {
				position: log.block_number,
				payload,
			})
			.collect();

		Ok(ScanBatch {
			payloads,
			next_checkpoint: to_block,
		})
	}

	fn name(&self) -> &'static str {
		"OnChainScanner"
	}
}

/// Scanner paging through the relayer's transaction log
pub struct RelayerScanner {
	relayer: Arc<dyn RelayerApi>,
	config: SyncConfig,
}

impl RelayerScanner {
	pub fn new(relayer: Arc<dyn RelayerApi>, config: SyncConfig) -> Self {
		Self { relayer, config }
	}
}

#[async_trait::async_trait]
impl EventScanner for RelayerScanner {
	async fn fetch(&self, checkpoint: u64) -> Result<ScanBatch, WalletSyncError> {
		let relayer = self.relayer.as_ref();
		let page_size = self.config.page_size.max(1);
		let mut offset = checkpoint;
		let mut payloads = Vec::new();

		for page_number in 0..self.config.max_pages.max(1) {
			let page = self
				.config
				.retry
				.run("GET /transactions", move || {
					relayer.fetch_transactions(offset, page_size)
				})
				.await?;

			let fetched = page.len() as u64;
			debug!(
				"Relayer page {} at offset {}: {} records",
				page_number, offset, fetched
			);
			payloads.extend(page.into_iter().enumerate().map(|(i, payload)| ScannedPayload {
				position: offset + i as u64,
				payload,
			}));
			offset += fetched;

			if fetched < page_size {
				break;
			}
		}

		Ok(ScanBatch {
			payloads,
			next_checkpoint: offset,
		})
	}

	async fn head_hint(&self) -> Result<Option<u64>, WalletSyncError> {
		Ok(Some(self.relayer.info().await?.delta_index))
	}

	fn dense_positions(&self) -> bool {
		true
	}

	fn name(&self) -> &'static str {
		"RelayerScanner"
	}
}
