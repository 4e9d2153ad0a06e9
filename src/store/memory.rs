//! Process-local [`CacheStore`] with sliding expiration, for single-instance hosts and tests.

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	store::{
		CacheBlob, CacheKey, CacheStore, CompareAndSwapOutcome, EntryVersion, StoreError,
		StoreFuture, StoredBlob,
	},
};

type EntryMap = Arc<RwLock<HashMap<CacheKey, MemoryEntry>>>;

/// Options for [`MemoryStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStoreOptions {
	/// Idle window after which an untouched entry expires.
	pub sliding_expiration: Duration,
}
impl MemoryStoreOptions {
	/// Default idle window (12 hours).
	pub const DEFAULT_SLIDING_EXPIRATION: Duration = Duration::hours(12);

	/// Overrides the sliding expiration window.
	pub fn with_sliding_expiration(mut self, window: Duration) -> Self {
		self.sliding_expiration = window;

		self
	}

	/// Rejects non-positive windows.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if !self.sliding_expiration.is_positive() {
			return Err(ConfigError::InvalidOption {
				option: "sliding_expiration",
				reason: "must be positive",
			});
		}

		Ok(())
	}
}
impl Default for MemoryStoreOptions {
	fn default() -> Self {
		Self { sliding_expiration: Self::DEFAULT_SLIDING_EXPIRATION }
	}
}

#[derive(Clone, Debug)]
struct MemoryEntry {
	blob: CacheBlob,
	version: EntryVersion,
	last_access: OffsetDateTime,
}
impl MemoryEntry {
	fn is_expired_at(&self, window: Duration, now: OffsetDateTime) -> bool {
		now - self.last_access > window
	}
}

/// Thread-safe store that keeps serialized caches in process memory.
///
/// Entries are lost on restart. Every successful read slides the entry's expiry forward.
#[derive(Clone, Debug)]
pub struct MemoryStore {
	entries: EntryMap,
	options: MemoryStoreOptions,
}
impl MemoryStore {
	/// Creates a store with validated options.
	pub fn new(options: MemoryStoreOptions) -> Result<Self, ConfigError> {
		options.validate()?;

		Ok(Self { entries: Default::default(), options })
	}

	/// Returns the active options.
	pub fn options(&self) -> &MemoryStoreOptions {
		&self.options
	}

	/// Number of entries currently held, including expired ones not yet purged.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns true when no entries are held.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}

	/// Drops every entry idle for longer than the sliding window, returning how many were removed.
	pub fn purge_expired(&self) -> usize {
		self.purge_expired_at(OffsetDateTime::now_utc())
	}

	pub(crate) fn purge_expired_at(&self, now: OffsetDateTime) -> usize {
		let window = self.options.sliding_expiration;
		let mut guard = self.entries.write();
		let before = guard.len();

		guard.retain(|_, entry| !entry.is_expired_at(window, now));

		before - guard.len()
	}

	pub(crate) fn read_at(&self, key: &CacheKey, now: OffsetDateTime) -> Option<StoredBlob> {
		let window = self.options.sliding_expiration;
		let mut guard = self.entries.write();

		if guard.get(key)?.is_expired_at(window, now) {
			guard.remove(key);

			return None;
		}

		let entry = guard.get_mut(key)?;

		entry.last_access = now;

		Some(StoredBlob { blob: entry.blob.clone(), version: entry.version })
	}

	fn current_version_at(
		guard: &HashMap<CacheKey, MemoryEntry>,
		key: &CacheKey,
		window: Duration,
		now: OffsetDateTime,
	) -> Option<EntryVersion> {
		guard.get(key).filter(|entry| !entry.is_expired_at(window, now)).map(|entry| entry.version)
	}

	pub(crate) fn write_at(
		&self,
		key: &CacheKey,
		blob: CacheBlob,
		now: OffsetDateTime,
	) -> EntryVersion {
		let version = EntryVersion::next();

		self.entries.write().insert(key.clone(), MemoryEntry { blob, version, last_access: now });

		version
	}

	pub(crate) fn cas_at(
		&self,
		key: &CacheKey,
		expected: Option<EntryVersion>,
		blob: CacheBlob,
		now: OffsetDateTime,
	) -> CompareAndSwapOutcome {
		let window = self.options.sliding_expiration;
		let mut guard = self.entries.write();
		let current = Self::current_version_at(&guard, key, window, now);

		if let Some(rejected) = CompareAndSwapOutcome::evaluate(current, expected) {
			return rejected;
		}

		let version = EntryVersion::next();

		guard.insert(key.clone(), MemoryEntry { blob, version, last_access: now });

		CompareAndSwapOutcome::Updated(version)
	}

	fn remove_now(&self, key: &CacheKey) -> bool {
		self.entries.write().remove(key).is_some()
	}
}
impl Default for MemoryStore {
	fn default() -> Self {
		Self { entries: Default::default(), options: MemoryStoreOptions::default() }
	}
}
impl CacheStore for MemoryStore {
	fn read<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<StoredBlob>> {
		Box::pin(async move { Ok(self.read_at(key, OffsetDateTime::now_utc())) })
	}

	fn write<'a>(&'a self, key: &'a CacheKey, blob: CacheBlob) -> StoreFuture<'a, EntryVersion> {
		Box::pin(async move { Ok(self.write_at(key, blob, OffsetDateTime::now_utc())) })
	}

	fn compare_and_swap<'a>(
		&'a self,
		key: &'a CacheKey,
		expected: Option<EntryVersion>,
		blob: CacheBlob,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move { Ok(self.cas_at(key, expected, blob, OffsetDateTime::now_utc())) })
	}

	fn remove<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, bool> {
		Box::pin(async move { Ok::<_, StoreError>(self.remove_now(key)) })
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	fn key() -> CacheKey {
		CacheKey::new("11.22").expect("Cache key fixture should be valid.")
	}

	fn store(window: Duration) -> MemoryStore {
		MemoryStore::new(MemoryStoreOptions::default().with_sliding_expiration(window))
			.expect("Memory store options should validate.")
	}

	#[test]
	fn idle_entries_expire_after_the_window() {
		let store = store(Duration::seconds(30));
		let start = macros::datetime!(2025-01-01 00:00 UTC);

		store.write_at(&key(), CacheBlob::new(b"blob".to_vec()), start);

		assert!(store.read_at(&key(), start + Duration::seconds(30)).is_some());
		assert!(store.read_at(&key(), start + Duration::seconds(61)).is_none());
		assert!(store.is_empty(), "Expired entries are dropped on read.");
	}

	#[test]
	fn reads_slide_the_expiry_forward() {
		let store = store(Duration::seconds(30));
		let start = macros::datetime!(2025-01-01 00:00 UTC);

		store.write_at(&key(), CacheBlob::new(b"blob".to_vec()), start);

		for step in 1..=5 {
			assert!(store.read_at(&key(), start + Duration::seconds(20 * step)).is_some());
		}
	}

	#[test]
	fn purge_only_removes_idle_entries() {
		let store = store(Duration::minutes(1));
		let start = macros::datetime!(2025-01-01 00:00 UTC);
		let fresh = CacheKey::new("fresh").expect("Cache key fixture should be valid.");

		store.write_at(&key(), CacheBlob::new(b"old".to_vec()), start);
		store.write_at(&fresh, CacheBlob::new(b"new".to_vec()), start + Duration::minutes(2));

		assert_eq!(store.purge_expired_at(start + Duration::minutes(2)), 1);
		assert_eq!(store.len(), 1);
	}

	#[test]
	fn cas_treats_expired_entries_as_missing() {
		let store = store(Duration::seconds(10));
		let start = macros::datetime!(2025-01-01 00:00 UTC);
		let version = store.write_at(&key(), CacheBlob::new(b"v1".to_vec()), start);
		let later = start + Duration::seconds(11);

		assert_eq!(
			store.cas_at(&key(), Some(version), CacheBlob::new(b"v2".to_vec()), later),
			CompareAndSwapOutcome::Missing
		);
		assert!(matches!(
			store.cas_at(&key(), None, CacheBlob::new(b"v2".to_vec()), later),
			CompareAndSwapOutcome::Updated(_)
		));
	}

	#[test]
	fn options_reject_non_positive_windows() {
		assert!(
			MemoryStore::new(MemoryStoreOptions::default().with_sliding_expiration(Duration::ZERO))
				.is_err()
		);
		assert_eq!(MemoryStoreOptions::default().sliding_expiration, Duration::hours(12));
	}
}
