//! Types for the relayer HTTP API

use crate::transaction::codec::{PrivateTxRecord, WIRE_PREFIX};
use crate::utils::Retryable;
use serde::{Deserialize, Serialize};

/// Relayer pool state from `GET /info`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelayerInfo {
	/// Current merkle root.
	pub root: String,
	/// Optimistic leaf index, including transactions still queued in the relayer.
	#[serde(rename = "deltaIndex")]
	pub delta_index: u64,
}

/// Job lifecycle states reported by `GET /job/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
	Queued,
	Completed,
	Failed,
	/// Any state this client does not know how to interpret.
	#[serde(other)]
	Unknown,
}

/// Job status from `GET /job/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
	pub state: JobState,
	/// Set once the job is completed.
	#[serde(rename = "txHash", default)]
	pub tx_hash: Option<String>,
	/// Failure description, when the relayer provides one.
	#[serde(rename = "failedReason", default)]
	pub failed_reason: Option<String>,
}

/// Public inputs and proofs as the relayer expects them, all `0x` hex.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelayerProof {
	/// nullifier, outCommit, transferIndex, energyAmount, tokenAmount, rootAfter
	pub inputs: Vec<String>,
	pub transact: Vec<String>,
	pub tree: Vec<String>,
}

/// Body of `POST /transaction`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelayerTxRequest {
	pub proof: RelayerProof,
	pub memo: String,
	#[serde(rename = "txType")]
	pub tx_type: String,
	#[serde(rename = "depositSignature", skip_serializing_if = "Option::is_none")]
	pub deposit_signature: Option<String>,
}

impl RelayerTxRequest {
	pub fn from_record(record: &PrivateTxRecord, deposit_signature: Option<String>) -> Self {
		let hex_word = |bytes: &[u8]| format!("{}{}", WIRE_PREFIX, hex::encode(bytes));
		let hex_int = |value: u64| format!("{}{:x}", WIRE_PREFIX, value);

		Self {
			proof: RelayerProof {
				inputs: vec![
					hex_word(&record.nullifier[..]),
					hex_word(&record.out_commit[..]),
					hex_int(record.transfer_index),
					hex_int(record.energy_amount),
					hex_int(record.token_amount),
					hex_word(&record.root_after[..]),
				],
				transact: record.transact_proof.iter().map(|w| hex_word(&w[..])).collect(),
				tree: record.tree_proof.iter().map(|w| hex_word(&w[..])).collect(),
			},
			memo: hex::encode(&record.memo),
			tx_type: record.tx_type.relayer_code().to_string(),
			deposit_signature,
		}
	}
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitResponse {
	#[serde(rename = "jobId")]
	pub job_id: Option<String>,
}

/// Error types for relayer operations
#[derive(Debug, thiserror::Error)]
pub enum RelayerError {
	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("Relayer responded {status}: {body}")]
	StatusError { status: u16, body: String },

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("Job {0} not found")]
	JobNotFound(String),

	#[error("Job {job_id} failed: {reason}")]
	JobFailed { job_id: String, reason: String },

	#[error("Job {0} completed without a transaction hash")]
	MissingTxHash(String),

	#[error("Job {0} reported an unrecognised state")]
	UnknownJobState(String),
}

impl Retryable for RelayerError {
	fn is_transient(&self) -> bool {
		match self {
			RelayerError::HttpError(e) => !e.is_decode() && !e.is_builder(),
			RelayerError::StatusError { status, .. } => *status == 429 || *status >= 500,
			_ => false,
		}
	}
}
