//!
//! HTTP client for the transaction relayer.
//!
//! The relayer keeps an ordered log of pool transactions (served page by page), accepts
//! proven transactions for submission as background jobs, and reports job progress.

use super::RelayerApi;
use super::types::*;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

/// Relayer HTTP client
#[derive(Clone)]
pub struct HttpRelayerClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Base URL of the relayer, without a trailing slash.
	relayer_url: String,
}

impl HttpRelayerClient {
	/// Create a new relayer client.
	///
	/// # Arguments
	/// * `relayer_url` - Base URL of the relayer API.
	pub fn new(relayer_url: String) -> Result<Self, RelayerError> {
		let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;

		Ok(Self {
			http_client,
			relayer_url: relayer_url.trim_end_matches('/').to_string(),
		})
	}

	fn endpoint(&self, path: &str) -> String {
		format!("{}/{}", self.relayer_url, path)
	}

	async fn ensure_success(response: Response) -> Result<Response, RelayerError> {
		let status = response.status();
		if status.is_success() {
			return Ok(response);
		}
		let body = response.text().await.unwrap_or_default();
		Err(RelayerError::StatusError {
			status: status.as_u16(),
			body,
		})
	}
}

#[async_trait]
impl RelayerApi for HttpRelayerClient {
	async fn fetch_transactions(&self, offset: u64, limit: u64) -> Result<Vec<String>, RelayerError> {
		debug!("Fetching relayer transactions offset={} limit={}", offset, limit);

		let response = self
			.http_client
			.get(self.endpoint("transactions"))
			.query(&[("offset", offset), ("limit", limit)])
			.send()
			.await?;

		let response = Self::ensure_success(response).await?;
		Ok(response.json().await?)
	}

	async fn submit_transaction(
		&self,
		request: &RelayerTxRequest,
	) -> Result<Option<String>, RelayerError> {
		let response = self
			.http_client
			.post(self.endpoint("transaction"))
			.json(request)
			.send()
			.await?;

		let response = Self::ensure_success(response).await?;
		let body = response.text().await?;
		if body.trim().is_empty() {
			info!("Relayer accepted transaction without a job");
			return Ok(None);
		}

		let parsed: SubmitResponse = serde_json::from_str(&body)?;
		Ok(parsed.job_id)
	}

	async fn job_status(&self, job_id: &str) -> Result<Option<JobStatus>, RelayerError> {
		let response = self
			.http_client
			.get(self.endpoint(&format!("job/{}", job_id)))
			.send()
			.await?;

		if response.status() == StatusCode::NOT_FOUND {
			return Ok(None);
		}

		let response = Self::ensure_success(response).await?;
		Ok(Some(response.json().await?))
	}

	async fn info(&self) -> Result<RelayerInfo, RelayerError> {
		let response = self.http_client.get(self.endpoint("info")).send().await?;
		let response = Self::ensure_success(response).await?;
		Ok(response.json().await?)
	}
}
