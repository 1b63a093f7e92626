//! Layered configuration for the operator binary.
//!
//! Values come from an optional `shielded-sync.toml` in the working directory, overridden by
//! `SHIELDED__*` environment variables (`SHIELDED__RETRY__ATTEMPTS=3`). A `.env` file is loaded
//! into the environment first.

use crate::chain::{ChainRpc, TransactionSigner};
use crate::transaction::submit::{ChainSender, DEFAULT_GAS_MULTIPLIER, PollConfig};
use crate::utils::{KeyedLocks, RetryPolicy};
use crate::wallet::SyncKey;
use crate::wallet::sync::strategies::SyncConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// `keccak256("Message(uint256,bytes32,bytes)")`, emitted by the pool for every transaction.
pub const DEFAULT_MESSAGE_TOPIC: &str =
	"0x7d39f8a6bc8929456fba511441be7361aa014ac6f8e21b99990ce9e1c7373536";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
	#[error("Configuration error: {0}")]
	Config(#[from] config::ConfigError),

	#[error("Missing setting: {0}")]
	Missing(&'static str),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
	pub attempts: u32,
	pub interval_ms: u64,
}

impl Default for RetrySettings {
	fn default() -> Self {
		Self {
			attempts: 5,
			interval_ms: 1000,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayerSettings {
	pub poll_interval_ms: u64,
	pub max_wait_secs: u64,
}

impl Default for RelayerSettings {
	fn default() -> Self {
		Self {
			poll_interval_ms: 3000,
			max_wait_secs: 600,
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
	/// Relayer base URL; selects relayer scanning when set
	pub relayer_url: Option<String>,
	/// Chain JSON-RPC endpoint, used when no relayer is configured
	pub rpc_url: Option<String>,
	pub pool_address: Option<String>,
	pub message_topic: String,
	/// Directory holding checkpoint files
	pub data_dir: PathBuf,
	pub account: String,
	pub token: String,
	pub page_size: u64,
	pub retry: RetrySettings,
	pub relayer: RelayerSettings,
	/// Gas limit sent with a direct transaction, as a multiple of the estimate
	pub gas_multiplier: u64,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			relayer_url: None,
			rpc_url: None,
			pool_address: None,
			message_topic: DEFAULT_MESSAGE_TOPIC.to_string(),
			data_dir: PathBuf::from("data"),
			account: "default".to_string(),
			token: "pool".to_string(),
			page_size: 100,
			retry: RetrySettings::default(),
			relayer: RelayerSettings::default(),
			gas_multiplier: DEFAULT_GAS_MULTIPLIER,
		}
	}
}

impl Settings {
	/// Load `.env`, then `shielded-sync.toml` and `SHIELDED__*` variables.
	pub fn load() -> Result<Self, SettingsError> {
		dotenvy::dotenv().ok();
		Self::from_sources(config::File::with_name("shielded-sync").required(false))
	}

	/// Load from an explicit file source plus the environment.
	pub fn from_sources<S>(file: S) -> Result<Self, SettingsError>
	where
		S: config::Source + Send + Sync + 'static,
	{
		let settings = config::Config::builder()
			.add_source(file)
			.add_source(
				config::Environment::with_prefix("SHIELDED")
					.separator("__")
					.try_parsing(true),
			)
			.build()?
			.try_deserialize()?;
		Ok(settings)
	}

	pub fn retry_policy(&self) -> RetryPolicy {
		RetryPolicy::new(
			self.retry.attempts.max(1),
			Duration::from_millis(self.retry.interval_ms),
		)
	}

	pub fn poll_config(&self) -> PollConfig {
		PollConfig {
			interval: Duration::from_millis(self.relayer.poll_interval_ms),
			max_wait: Duration::from_secs(self.relayer.max_wait_secs),
		}
	}

	pub fn sync_config(&self) -> SyncConfig {
		SyncConfig {
			page_size: self.page_size,
			retry: self.retry_policy(),
			..SyncConfig::default()
		}
	}

	/// Sender for direct submissions and allowance top-ups, with the configured retries,
	/// receipt wait and gas headroom.
	pub fn chain_sender(
		&self,
		rpc: Arc<dyn ChainRpc>,
		signer: Arc<dyn TransactionSigner>,
		locks: KeyedLocks<String>,
	) -> ChainSender {
		ChainSender::new(rpc, signer, locks, self.retry_policy(), self.poll_config())
			.with_gas_multiplier(self.gas_multiplier)
	}

	pub fn sync_key(&self) -> SyncKey {
		SyncKey::new(self.account.clone(), self.token.clone())
	}

	pub fn require_pool_address(&self) -> Result<&str, SettingsError> {
		self.pool_address
			.as_deref()
			.ok_or(SettingsError::Missing("pool_address"))
	}
}
