//! Types for the EVM JSON-RPC surface used by the scanner and the direct submitter.

use crate::utils::Retryable;
use serde::{Deserialize, Serialize};

/// `allowance(address,address)`
pub const ALLOWANCE_SELECTOR: [u8; 4] = [0xdd, 0x62, 0xed, 0x3e];
/// `increaseAllowance(address,uint256)`
pub const INCREASE_ALLOWANCE_SELECTOR: [u8; 4] = [0x39, 0x50, 0x93, 0x51];

/// Log query over an inclusive block range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
	pub address: String,
	pub topic: String,
	pub from_block: u64,
	pub to_block: u64,
}

/// A log entry matched by a [`LogFilter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLog {
	pub block_number: u64,
	pub log_index: u64,
	pub transaction_hash: String,
}

/// Call parameters for gas estimation.
#[derive(Debug, Clone, Serialize)]
pub struct CallRequest {
	pub from: String,
	pub to: String,
	pub data: String,
	#[serde(serialize_with = "serialize_quantity")]
	pub value: u128,
}

/// Legacy transaction handed to a [`crate::chain::TransactionSigner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
	pub chain_id: u64,
	pub nonce: u64,
	pub to: String,
	pub data: String,
	pub value: u128,
	pub gas_limit: u64,
	pub gas_price: u128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
	pub transaction_hash: String,
	pub block_number: u64,
	pub success: bool,
}

/// Errors from the chain RPC transport.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("HTTP status {0}")]
	StatusError(u16),

	#[error("Provider unavailable: {0}")]
	Unavailable(String),

	#[error("JSON-RPC error {code}: {message}")]
	RpcError { code: i64, message: String },

	#[error("Invalid response: {0}")]
	InvalidResponse(String),

	#[error("Invalid address: {0}")]
	InvalidAddress(String),
}

impl Retryable for RpcError {
	fn is_transient(&self) -> bool {
		match self {
			RpcError::HttpError(e) => !e.is_decode() && !e.is_builder(),
			RpcError::StatusError(status) => *status == 429 || *status >= 500,
			RpcError::Unavailable(_) => true,
			// -32005: limit exceeded, -32603: internal error
			RpcError::RpcError { code, .. } => matches!(code, -32005 | -32603),
			RpcError::InvalidResponse(_) | RpcError::InvalidAddress(_) => false,
		}
	}
}

/// Raised by signers; never retried.
#[derive(Debug, thiserror::Error)]
#[error("Signing failed: {0}")]
pub struct SignerError(pub String);

/// Formats a JSON-RPC quantity (`0x`-prefixed, no leading zeros).
pub fn to_quantity(value: u128) -> String {
	format!("0x{:x}", value)
}

/// Parses a JSON-RPC quantity.
pub fn parse_quantity(value: &str) -> Result<u128, RpcError> {
	let digits = value
		.strip_prefix("0x")
		.ok_or_else(|| RpcError::InvalidResponse(format!("Quantity without 0x: {}", value)))?;
	if digits.is_empty() {
		return Ok(0);
	}
	u128::from_str_radix(digits, 16)
		.map_err(|e| RpcError::InvalidResponse(format!("Invalid quantity {}: {}", value, e)))
}

pub fn parse_quantity_u64(value: &str) -> Result<u64, RpcError> {
	let wide = parse_quantity(value)?;
	u64::try_from(wide)
		.map_err(|_| RpcError::InvalidResponse(format!("Quantity {} exceeds u64", value)))
}

fn serialize_quantity<S: serde::Serializer>(value: &u128, s: S) -> Result<S::Ok, S::Error> {
	s.serialize_str(&to_quantity(*value))
}

/// Left-pads a 20-byte address into an ABI word.
pub fn abi_address(address: &str) -> Result<String, RpcError> {
	let body = address.strip_prefix("0x").unwrap_or(address);
	let bytes = hex::decode(body).map_err(|_| RpcError::InvalidAddress(address.to_string()))?;
	if bytes.len() != 20 {
		return Err(RpcError::InvalidAddress(address.to_string()));
	}
	Ok(format!("{:0>64}", hex::encode(bytes)))
}

pub fn abi_uint(value: u128) -> String {
	format!("{:064x}", value)
}

/// Decodes a single `uint256` return word, saturating at `u128::MAX`.
///
/// Unlimited approvals are `type(uint256).max`, which must read as "enough" rather than fail.
pub fn decode_uint_word(raw: &str) -> Result<u128, RpcError> {
	let body = raw.strip_prefix("0x").unwrap_or(raw);
	let bytes = hex::decode(body)
		.map_err(|e| RpcError::InvalidResponse(format!("uint256 result {}: {}", raw, e)))?;
	if bytes.len() != 32 {
		return Err(RpcError::InvalidResponse(format!(
			"uint256 result has {} bytes: {}",
			bytes.len(),
			raw
		)));
	}
	if bytes[..16].iter().any(|b| *b != 0) {
		return Ok(u128::MAX);
	}
	let mut low = [0u8; 16];
	low.copy_from_slice(&bytes[16..]);
	Ok(u128::from_be_bytes(low))
}

/// Calldata for `allowance(owner, spender)`.
pub fn encode_allowance_call(owner: &str, spender: &str) -> Result<String, RpcError> {
	Ok(format!(
		"0x{}{}{}",
		hex::encode(ALLOWANCE_SELECTOR),
		abi_address(owner)?,
		abi_address(spender)?
	))
}

/// Calldata for `increaseAllowance(spender, delta)`.
pub fn encode_increase_allowance(spender: &str, delta: u128) -> Result<String, RpcError> {
	Ok(format!(
		"0x{}{}{}",
		hex::encode(INCREASE_ALLOWANCE_SELECTOR),
		abi_address(spender)?,
		abi_uint(delta)
	))
}

/// Raw JSON-RPC log as returned by `eth_getLogs`.
#[derive(Debug, Deserialize)]
pub(crate) struct RawLog {
	#[serde(rename = "blockNumber")]
	pub block_number: String,
	#[serde(rename = "logIndex")]
	pub log_index: String,
	#[serde(rename = "transactionHash")]
	pub transaction_hash: String,
	#[serde(default)]
	pub removed: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawTransaction {
	pub input: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawReceipt {
	#[serde(rename = "transactionHash")]
	pub transaction_hash: String,
	#[serde(rename = "blockNumber")]
	pub block_number: String,
	pub status: Option<String>,
}
