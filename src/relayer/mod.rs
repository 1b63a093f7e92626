//! Relayer integration module
//!
//! This module provides the client and types for talking to a transaction relayer. The relayer
//! serves the pool's transaction log for scanning and submits proven transactions on the user's
//! behalf, tracking each submission as a job.

/// HTTP client for the relayer API
mod client;
/// Type definitions for relayer requests and responses
mod types;

pub use client::HttpRelayerClient;
pub use types::*;

use async_trait::async_trait;

/// Relayer operations consumed by the scanner and the relayed submitter.
#[async_trait]
pub trait RelayerApi: Send + Sync {
	/// `GET /transactions?offset&limit`: raw payloads in pool order.
	async fn fetch_transactions(&self, offset: u64, limit: u64) -> Result<Vec<String>, RelayerError>;

	/// `POST /transaction`: returns the job id, or `None` when the relayer accepted the
	/// transaction without one to follow.
	async fn submit_transaction(
		&self,
		request: &RelayerTxRequest,
	) -> Result<Option<String>, RelayerError>;

	/// `GET /job/{id}`; `None` when the relayer does not know the job.
	async fn job_status(&self, job_id: &str) -> Result<Option<JobStatus>, RelayerError>;

	/// `GET /info`
	async fn info(&self) -> Result<RelayerInfo, RelayerError>;
}
