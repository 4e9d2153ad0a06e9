//! Per-key reader-writer locks shared across every request in a process.

// self
use crate::{_prelude::*, store::CacheKey};

/// Table of async reader-writer locks, one per cache key.
///
/// Readers of a key share its lock, writers exclude each other and readers, and distinct keys
/// never contend. Clone the table (it is reference counted) into every store that should
/// coordinate with the others.
#[derive(Clone, Debug, Default)]
pub struct KeyedLocks(Arc<Mutex<HashMap<CacheKey, Arc<AsyncRwLock<()>>>>>);
impl KeyedLocks {
	/// Returns (and creates on demand) the lock guarding `key`.
	pub fn lock_for(&self, key: &CacheKey) -> Arc<AsyncRwLock<()>> {
		let mut locks = self.0.lock();

		locks.entry(key.clone()).or_insert_with(|| Arc::new(AsyncRwLock::new(()))).clone()
	}

	/// Drops lock entries no caller currently holds a handle to.
	pub fn prune(&self) -> usize {
		let mut locks = self.0.lock();
		let before = locks.len();

		locks.retain(|_, lock| Arc::strong_count(lock) > 1);

		before - locks.len()
	}

	/// Number of keys that currently have a lock entry.
	pub fn len(&self) -> usize {
		self.0.lock().len()
	}

	/// Returns true if no lock entries exist.
	pub fn is_empty(&self) -> bool {
		self.0.lock().is_empty()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn key(raw: &str) -> CacheKey {
		CacheKey::new(raw).expect("Cache key fixture should be valid.")
	}

	#[test]
	fn same_key_shares_a_lock() {
		let locks = KeyedLocks::default();
		let a = locks.lock_for(&key("11.22"));
		let b = locks.lock_for(&key("11.22"));
		let c = locks.lock_for(&key("33.44"));

		assert!(Arc::ptr_eq(&a, &b));
		assert!(!Arc::ptr_eq(&a, &c));
	}

	#[tokio::test]
	async fn writers_on_distinct_keys_do_not_block() {
		let locks = KeyedLocks::default();
		let first = locks.lock_for(&key("11.22"));
		let second = locks.lock_for(&key("33.44"));
		let _held = first.write().await;

		assert!(second.try_write().is_some(), "Unrelated keys must not contend.");
		assert!(first.try_read().is_none(), "Readers wait for the writer on the same key.");
	}

	#[test]
	fn prune_keeps_locks_in_use() {
		let locks = KeyedLocks::default();
		let held = locks.lock_for(&key("11.22"));

		drop(locks.lock_for(&key("33.44")));

		assert_eq!(locks.prune(), 1);
		assert_eq!(locks.len(), 1);

		drop(held);

		assert_eq!(locks.prune(), 1);
		assert!(locks.is_empty());
	}
}
