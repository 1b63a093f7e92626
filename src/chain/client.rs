//!
//! JSON-RPC client for EVM-compatible providers.
//!
//! Thin transport: one method per RPC call the engine needs, no retries. Callers wrap read
//! calls in a [`crate::utils::RetryPolicy`].

use super::types::*;
use super::ChainRpc;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// HTTP JSON-RPC provider client
pub struct JsonRpcClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Provider endpoint.
	url: String,
	next_id: AtomicU64,
}

impl JsonRpcClient {
	/// Create a new provider client.
	///
	/// # Arguments
	/// * `url` - The provider's HTTP endpoint.
	pub fn new(url: String) -> Result<Self, RpcError> {
		let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;

		Ok(Self {
			http_client,
			url,
			next_id: AtomicU64::new(1),
		})
	}

	/// Execute a JSON-RPC call and deserialize its `result`.
	pub async fn call<T: DeserializeOwned>(
		&self,
		method: &str,
		params: Value,
	) -> Result<T, RpcError> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let request_body = json!({
			"jsonrpc": "2.0",
			"id": id,
			"method": method,
			"params": params,
		});
		debug!("JSON-RPC request {} ({})", method, id);

		let response = self
			.http_client
			.post(&self.url)
			.header("Content-Type", "application/json")
			.json(&request_body)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(RpcError::StatusError(response.status().as_u16()));
		}

		let mut response_json: Value = response.json().await?;

		if let Some(error) = response_json.get("error") {
			return Err(RpcError::RpcError {
				code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
				message: error
					.get("message")
					.and_then(Value::as_str)
					.unwrap_or("unknown error")
					.to_string(),
			});
		}

		let result = response_json
			.get_mut("result")
			.map(Value::take)
			.ok_or_else(|| RpcError::InvalidResponse(format!("{} returned no result", method)))?;

		serde_json::from_value(result)
			.map_err(|e| RpcError::InvalidResponse(format!("{} result: {}", method, e)))
	}

	async fn quantity(&self, method: &str, params: Value) -> Result<u128, RpcError> {
		let raw: String = self.call(method, params).await?;
		parse_quantity(&raw)
	}
}

#[async_trait]
impl ChainRpc for JsonRpcClient {
	async fn chain_id(&self) -> Result<u64, RpcError> {
		let raw: String = self.call("eth_chainId", json!([])).await?;
		parse_quantity_u64(&raw)
	}

	async fn block_number(&self) -> Result<u64, RpcError> {
		let raw: String = self.call("eth_blockNumber", json!([])).await?;
		parse_quantity_u64(&raw)
	}

	async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<ChainLog>, RpcError> {
		let raw_logs: Vec<RawLog> = self
			.call(
				"eth_getLogs",
				json!([{
					"address": filter.address,
					"topics": [filter.topic],
					"fromBlock": to_quantity(filter.from_block.into()),
					"toBlock": to_quantity(filter.to_block.into()),
				}]),
			)
			.await?;

		let mut logs = Vec::with_capacity(raw_logs.len());
		for raw in raw_logs.into_iter().filter(|l| !l.removed) {
			logs.push(ChainLog {
				block_number: parse_quantity_u64(&raw.block_number)?,
				log_index: parse_quantity_u64(&raw.log_index)?,
				transaction_hash: raw.transaction_hash,
			});
		}
		logs.sort_by_key(|log| (log.block_number, log.log_index));
		Ok(logs)
	}

	async fn transaction_input(&self, tx_hash: &str) -> Result<String, RpcError> {
		let tx: Option<RawTransaction> = self
			.call("eth_getTransactionByHash", json!([tx_hash]))
			.await?;
		tx.map(|t| t.input)
			.ok_or_else(|| RpcError::InvalidResponse(format!("Transaction {} not found", tx_hash)))
	}

	async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, RpcError> {
		let raw: String = self.call("eth_estimateGas", json!([call])).await?;
		parse_quantity_u64(&raw)
	}

	async fn gas_price(&self) -> Result<u128, RpcError> {
		self.quantity("eth_gasPrice", json!([])).await
	}

	async fn nonce(&self, address: &str) -> Result<u64, RpcError> {
		let raw: String = self
			.call("eth_getTransactionCount", json!([address, "pending"]))
			.await?;
		parse_quantity_u64(&raw)
	}

	async fn allowance(&self, token: &str, owner: &str, spender: &str) -> Result<u128, RpcError> {
		let data = encode_allowance_call(owner, spender)?;
		let raw: String = self
			.call("eth_call", json!([{ "to": token, "data": data }, "latest"]))
			.await?;
		decode_uint_word(&raw)
	}

	async fn send_raw_transaction(&self, raw_tx: &str) -> Result<String, RpcError> {
		self.call("eth_sendRawTransaction", json!([raw_tx])).await
	}

	async fn transaction_receipt(
		&self,
		tx_hash: &str,
	) -> Result<Option<TransactionReceipt>, RpcError> {
		let receipt: Option<RawReceipt> = self
			.call("eth_getTransactionReceipt", json!([tx_hash]))
			.await?;
		receipt
			.map(|r| {
				Ok(TransactionReceipt {
					block_number: parse_quantity_u64(&r.block_number)?,
					success: r.status.as_deref() == Some("0x1"),
					transaction_hash: r.transaction_hash,
				})
			})
			.transpose()
	}
}
