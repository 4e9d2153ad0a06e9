//! [`CacheStore`] that keeps each serialized cache in the caller's HTTP session.

// self
use crate::{
	_prelude::*,
	store::{
		CacheBlob, CacheKey, CacheStore, CompareAndSwapOutcome, EntryVersion, KeyedLocks,
		StoreError, StoreFuture, StoredBlob,
	},
};

const VERSION_PREFIX_LEN: usize = 8;

/// Key/value bag of one HTTP session, as exposed by the host's session middleware.
pub trait HttpSession
where
	Self: Send + Sync,
{
	/// Loads the session from its backing storage; called before any `get`.
	fn load(&self) -> StoreFuture<'_, ()>;

	/// Returns the raw value stored under `key`.
	fn get(&self, key: &str) -> Option<Vec<u8>>;

	/// Stores a raw value under `key`.
	fn set(&self, key: &str, value: Vec<u8>);

	/// Removes the value under `key`, returning whether one existed.
	fn remove(&self, key: &str) -> bool;

	/// Persists pending changes back to the session's backing storage.
	fn commit(&self) -> StoreFuture<'_, ()>;
}

/// In-process [`HttpSession`] for tests and single-node hosts.
#[derive(Clone, Debug, Default)]
pub struct MemorySession(Arc<RwLock<HashMap<String, Vec<u8>>>>);
impl MemorySession {
	/// Number of values held by the session.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns true when the session holds no values.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl HttpSession for MemorySession {
	fn load(&self) -> StoreFuture<'_, ()> {
		Box::pin(async { Ok(()) })
	}

	fn get(&self, key: &str) -> Option<Vec<u8>> {
		self.0.read().get(key).cloned()
	}

	fn set(&self, key: &str, value: Vec<u8>) {
		self.0.write().insert(key.to_owned(), value);
	}

	fn remove(&self, key: &str) -> bool {
		self.0.write().remove(key).is_some()
	}

	fn commit(&self) -> StoreFuture<'_, ()> {
		Box::pin(async { Ok(()) })
	}
}

/// Session-backed store guarded by per-key reader-writer locks.
///
/// Values are stored as an 8-byte big-endian version stamp followed by the blob. The lock table is
/// meant to be shared process-wide (clone one [`KeyedLocks`] into every request's store), so two
/// requests touching the same key serialize while unrelated users proceed in parallel.
#[derive(Clone)]
pub struct SessionStore {
	session: Arc<dyn HttpSession>,
	locks: KeyedLocks,
}
impl SessionStore {
	/// Builds a store over one request's session and the shared lock table.
	pub fn new(session: Arc<dyn HttpSession>, locks: KeyedLocks) -> Self {
		Self { session, locks }
	}

	/// Returns the shared lock table.
	pub fn locks(&self) -> &KeyedLocks {
		&self.locks
	}

	fn encode(version: EntryVersion, blob: &CacheBlob) -> Vec<u8> {
		let mut bytes = Vec::with_capacity(VERSION_PREFIX_LEN + blob.len());

		bytes.extend_from_slice(&version.get().to_be_bytes());
		bytes.extend_from_slice(blob.as_bytes());

		bytes
	}

	fn decode(mut bytes: Vec<u8>) -> Result<StoredBlob, StoreError> {
		if bytes.len() < VERSION_PREFIX_LEN {
			return Err(StoreError::Serialization {
				message: format!(
					"Session value is {} bytes; expected a version prefix",
					bytes.len()
				),
			});
		}

		let blob = bytes.split_off(VERSION_PREFIX_LEN);
		let mut prefix = [0_u8; VERSION_PREFIX_LEN];

		prefix.copy_from_slice(&bytes);

		Ok(StoredBlob {
			blob: CacheBlob::new(blob),
			version: EntryVersion::new(u64::from_be_bytes(prefix)),
		})
	}

	fn current(&self, key: &CacheKey) -> Result<Option<StoredBlob>, StoreError> {
		self.session.get(key.as_str()).map(Self::decode).transpose()
	}

	async fn store_locked(
		&self,
		key: &CacheKey,
		blob: &CacheBlob,
	) -> Result<EntryVersion, StoreError> {
		let version = EntryVersion::next();

		self.session.set(key.as_str(), Self::encode(version, blob));
		self.session.commit().await?;

		Ok(version)
	}
}
impl Debug for SessionStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionStore").field("locked_keys", &self.locks.len()).finish()
	}
}
impl CacheStore for SessionStore {
	fn read<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<StoredBlob>> {
		Box::pin(async move {
			let lock = self.locks.lock_for(key);
			let _shared = lock.read().await;

			self.session.load().await?;
			self.current(key)
		})
	}

	fn write<'a>(&'a self, key: &'a CacheKey, blob: CacheBlob) -> StoreFuture<'a, EntryVersion> {
		Box::pin(async move {
			let lock = self.locks.lock_for(key);
			let _exclusive = lock.write().await;

			self.session.load().await?;
			self.store_locked(key, &blob).await
		})
	}

	fn compare_and_swap<'a>(
		&'a self,
		key: &'a CacheKey,
		expected: Option<EntryVersion>,
		blob: CacheBlob,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move {
			let lock = self.locks.lock_for(key);
			let _exclusive = lock.write().await;

			self.session.load().await?;

			let current = self.current(key)?.map(|stored| stored.version);

			if let Some(rejected) = CompareAndSwapOutcome::evaluate(current, expected) {
				return Ok(rejected);
			}

			self.store_locked(key, &blob).await.map(CompareAndSwapOutcome::Updated)
		})
	}

	fn remove<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, bool> {
		Box::pin(async move {
			let removed = {
				let lock = self.locks.lock_for(key);
				let _exclusive = lock.write().await;

				self.session.load().await?;

				let removed = self.session.remove(key.as_str());

				self.session.commit().await?;

				removed
			};

			self.locks.prune();

			Ok(removed)
		})
	}
}
