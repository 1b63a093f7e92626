use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Exclusive async locks keyed by `K`.
///
/// Clones share the same registry, so every holder of a clone contends on the same per-key
/// lock. Entries are never evicted; the key space (wallet/token pairs, signing addresses) is
/// small.
pub struct KeyedLocks<K> {
	inner: Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>,
}

impl<K> Clone for KeyedLocks<K> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
	fn default() -> Self {
		Self::new()
	}
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
	pub fn new() -> Self {
		Self {
			inner: Arc::new(Mutex::new(HashMap::new())),
		}
	}

	/// Waits for exclusive access to `key`. Released when the guard drops.
	pub async fn acquire(&self, key: &K) -> OwnedMutexGuard<()> {
		let lock = {
			let mut registry = self.inner.lock().unwrap_or_else(|e| e.into_inner());
			registry.entry(key.clone()).or_default().clone()
		};
		lock.lock_owned().await
	}
}
