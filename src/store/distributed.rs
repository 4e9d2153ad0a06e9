//! [`CacheStore`] adapter over an external shared cache, for multi-instance deployments.
//!
//! The shared cache itself (a network key-value service, a SQL-backed cache, a shared file) is
//! reached through [`DistributedCache`]. [`DistributedStore`] only adds entry-expiration policy on
//! top of it, so a user's cache follows them across server instances.

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	store::{
		CacheBlob, CacheKey, CacheStore, CompareAndSwapOutcome, EntryVersion, StoreFuture,
		StoredBlob,
	},
};

/// Client contract for an external shared cache.
///
/// Implementations own expiry enforcement: an entry past its absolute deadline, or idle for longer
/// than its sliding window, must read back as absent. Reads do not touch the sliding window;
/// callers reset it through [`DistributedCache::refresh`].
pub trait DistributedCache
where
	Self: Send + Sync,
{
	/// Fetches the value and version stored under `key`.
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<StoredBlob>>;

	/// Stores the value unconditionally.
	fn set<'a>(
		&'a self,
		key: &'a str,
		value: CacheBlob,
		options: &'a DistributedEntryOptions,
	) -> StoreFuture<'a, EntryVersion>;

	/// Stores the value only if the current version matches `expected`.
	fn set_if_version<'a>(
		&'a self,
		key: &'a str,
		expected: Option<EntryVersion>,
		value: CacheBlob,
		options: &'a DistributedEntryOptions,
	) -> StoreFuture<'a, CompareAndSwapOutcome>;

	/// Removes the value, returning whether one existed.
	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool>;

	/// Resets the sliding window without reading the value.
	fn refresh<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool>;
}

/// Expiration policy applied to every entry written through [`DistributedStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributedEntryOptions {
	/// Hard lifetime measured from the write.
	pub absolute_expiration_relative_to_now: Option<Duration>,
	/// Idle window after which an untouched entry expires.
	pub sliding_expiration: Option<Duration>,
}
impl DistributedEntryOptions {
	/// Default idle window (12 hours).
	pub const DEFAULT_SLIDING_EXPIRATION: Duration = Duration::hours(12);

	/// Entries never expire on their own.
	pub const fn never_expire() -> Self {
		Self { absolute_expiration_relative_to_now: None, sliding_expiration: None }
	}

	/// Sets the hard lifetime.
	pub fn with_absolute_expiration(mut self, lifetime: Duration) -> Self {
		self.absolute_expiration_relative_to_now = Some(lifetime);

		self
	}

	/// Sets the idle window.
	pub fn with_sliding_expiration(mut self, window: Duration) -> Self {
		self.sliding_expiration = Some(window);

		self
	}

	/// Rejects non-positive windows.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.absolute_expiration_relative_to_now.is_some_and(|d| !d.is_positive()) {
			return Err(ConfigError::InvalidOption {
				option: "absolute_expiration_relative_to_now",
				reason: "must be positive",
			});
		}
		if self.sliding_expiration.is_some_and(|d| !d.is_positive()) {
			return Err(ConfigError::InvalidOption {
				option: "sliding_expiration",
				reason: "must be positive",
			});
		}

		Ok(())
	}

	/// Computes the absolute deadline for an entry written at `now`.
	pub fn absolute_deadline(&self, now: OffsetDateTime) -> Option<OffsetDateTime> {
		self.absolute_expiration_relative_to_now.map(|lifetime| now + lifetime)
	}
}
impl Default for DistributedEntryOptions {
	fn default() -> Self {
		Self {
			absolute_expiration_relative_to_now: None,
			sliding_expiration: Some(Self::DEFAULT_SLIDING_EXPIRATION),
		}
	}
}

/// Store that delegates to a shared [`DistributedCache`] client.
#[derive(Debug)]
pub struct DistributedStore<C>
where
	C: ?Sized + DistributedCache,
{
	cache: Arc<C>,
	options: DistributedEntryOptions,
}
impl<C> DistributedStore<C>
where
	C: ?Sized + DistributedCache,
{
	/// Wraps a shared cache client with validated entry options.
	pub fn new(
		cache: impl Into<Arc<C>>,
		options: DistributedEntryOptions,
	) -> Result<Self, ConfigError> {
		options.validate()?;

		Ok(Self { cache: cache.into(), options })
	}

	/// Returns the wrapped client.
	pub fn cache(&self) -> &Arc<C> {
		&self.cache
	}

	/// Returns the entry options.
	pub fn options(&self) -> &DistributedEntryOptions {
		&self.options
	}
}
impl<C> Clone for DistributedStore<C>
where
	C: ?Sized + DistributedCache,
{
	fn clone(&self) -> Self {
		Self { cache: self.cache.clone(), options: self.options }
	}
}
impl<C> CacheStore for DistributedStore<C>
where
	C: ?Sized + DistributedCache,
{
	fn read<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<StoredBlob>> {
		Box::pin(async move {
			let stored = self.cache.get(key.as_str()).await?;

			if stored.is_some() && self.options.sliding_expiration.is_some() {
				self.cache.refresh(key.as_str()).await?;
			}

			Ok(stored)
		})
	}

	fn write<'a>(&'a self, key: &'a CacheKey, blob: CacheBlob) -> StoreFuture<'a, EntryVersion> {
		self.cache.set(key.as_str(), blob, &self.options)
	}

	fn compare_and_swap<'a>(
		&'a self,
		key: &'a CacheKey,
		expected: Option<EntryVersion>,
		blob: CacheBlob,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		self.cache.set_if_version(key.as_str(), expected, blob, &self.options)
	}

	fn remove<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, bool> {
		self.cache.remove(key.as_str())
	}
}
