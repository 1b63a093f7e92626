use crate::wallet::WalletSyncError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info};

/// Keyed storage for sync checkpoints.
#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
	async fn load(&self, key: &str) -> Result<Option<u64>, WalletSyncError>;
	async fn save(&self, key: &str, height: u64) -> Result<(), WalletSyncError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
	sync_height: u64,
	timestamp: String,
}

/// File-based implementation of CheckpointStore
///
/// One JSON file per key, replaced atomically through a temporary file and a rename.
pub struct FileCheckpointStore {
	data_dir: PathBuf,
}

impl FileCheckpointStore {
	pub fn new(data_dir: PathBuf) -> Self {
		Self { data_dir }
	}

	fn get_checkpoint_filename(&self, key: &str) -> PathBuf {
		let sanitized: String = key
			.chars()
			.map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
			.collect();
		self.data_dir
			.join(format!("checkpoint_{}_{}.json", sanitized, hex::encode(key)))
	}
}

#[async_trait::async_trait]
impl CheckpointStore for FileCheckpointStore {
	async fn load(&self, key: &str) -> Result<Option<u64>, WalletSyncError> {
		let filename = self.get_checkpoint_filename(key);
		let content = match tokio::fs::read_to_string(&filename).await {
			Ok(content) => content,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(e.into()),
		};

		let checkpoint: CheckpointFile = serde_json::from_str(&content).map_err(|e| {
			WalletSyncError::CheckpointError(format!("Failed to parse checkpoint file: {}", e))
		})?;

		debug!(
			"Loaded checkpoint {} for {} (written {})",
			checkpoint.sync_height, key, checkpoint.timestamp
		);
		Ok(Some(checkpoint.sync_height))
	}

	async fn save(&self, key: &str, height: u64) -> Result<(), WalletSyncError> {
		tokio::fs::create_dir_all(&self.data_dir).await?;

		let checkpoint = CheckpointFile {
			sync_height: height,
			timestamp: chrono::Utc::now().to_rfc3339(),
		};
		let content = serde_json::to_string_pretty(&checkpoint).map_err(|e| {
			WalletSyncError::CheckpointError(format!("Failed to serialize checkpoint: {}", e))
		})?;

		let filename = self.get_checkpoint_filename(key);
		let tmp_filename = filename.with_extension("json.tmp");
		tokio::fs::write(&tmp_filename, content).await?;
		tokio::fs::rename(&tmp_filename, &filename).await?;

		info!("Saved checkpoint {} for {} to {:?}", height, key, filename);
		Ok(())
	}
}

/// In-memory implementation of CheckpointStore, for tests and ephemeral runs.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
	entries: Mutex<HashMap<String, u64>>,
}

impl InMemoryCheckpointStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait::async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
	async fn load(&self, key: &str) -> Result<Option<u64>, WalletSyncError> {
		let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
		Ok(entries.get(key).copied())
	}

	async fn save(&self, key: &str, height: u64) -> Result<(), WalletSyncError> {
		let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
		entries.insert(key.to_string(), height);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_file_store_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileCheckpointStore::new(dir.path().join("state"));

		assert_eq!(store.load("alice:usdc").await.unwrap(), None);

		store.save("alice:usdc", 1200).await.unwrap();
		store.save("bob:usdc", 7).await.unwrap();
		store.save("alice:usdc", 1300).await.unwrap();

		assert_eq!(store.load("alice:usdc").await.unwrap(), Some(1300));
		assert_eq!(store.load("bob:usdc").await.unwrap(), Some(7));
	}

	#[tokio::test]
	async fn test_file_store_keys_do_not_collide_after_sanitizing() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileCheckpointStore::new(dir.path().to_path_buf());

		store.save("a:b", 1).await.unwrap();
		store.save("a/b", 2).await.unwrap();

		assert_eq!(store.load("a:b").await.unwrap(), Some(1));
		assert_eq!(store.load("a/b").await.unwrap(), Some(2));
	}

	#[tokio::test]
	async fn test_file_store_rejects_corrupt_file() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileCheckpointStore::new(dir.path().to_path_buf());
		tokio::fs::write(store.get_checkpoint_filename("k"), "not json")
			.await
			.unwrap();

		assert!(matches!(
			store.load("k").await,
			Err(WalletSyncError::CheckpointError(_))
		));
	}
}
