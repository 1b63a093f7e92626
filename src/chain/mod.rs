//! Chain access for the on-chain scanner and the direct submitter.
//!
//! The engine talks to the chain through [`ChainRpc`] and signs through
//! [`TransactionSigner`]; key management and the raw transport live behind those seams.

/// JSON-RPC transport
mod client;
/// RPC types, calldata helpers and errors
mod types;

pub use client::JsonRpcClient;
pub use types::*;

use async_trait::async_trait;

/// Chain calls consumed by the engine.
#[async_trait]
pub trait ChainRpc: Send + Sync {
	async fn chain_id(&self) -> Result<u64, RpcError>;

	async fn block_number(&self) -> Result<u64, RpcError>;

	/// Logs matching `filter`, ordered by block then log index.
	async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<ChainLog>, RpcError>;

	/// Hex calldata of a mined transaction.
	async fn transaction_input(&self, tx_hash: &str) -> Result<String, RpcError>;

	async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, RpcError>;

	async fn gas_price(&self) -> Result<u128, RpcError>;

	/// Next nonce for `address`, pending transactions included.
	async fn nonce(&self, address: &str) -> Result<u64, RpcError>;

	/// ERC-20 allowance granted by `owner` to `spender`.
	async fn allowance(&self, token: &str, owner: &str, spender: &str) -> Result<u128, RpcError>;

	/// Broadcasts a signed transaction, returning its hash.
	async fn send_raw_transaction(&self, raw_tx: &str) -> Result<String, RpcError>;

	async fn transaction_receipt(&self, tx_hash: &str)
	-> Result<Option<TransactionReceipt>, RpcError>;
}

/// Local signer holding the spending key.
pub trait TransactionSigner: Send + Sync {
	/// Checksummed or lowercase `0x` address of the key.
	fn address(&self) -> &str;

	/// Signs `tx`, returning the raw `0x` RLP payload ready for broadcast.
	fn sign(&self, tx: &UnsignedTransaction) -> Result<String, SignerError>;
}
