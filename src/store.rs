//! Backing-store contracts and the built-in store variants for serialized token caches.

pub mod cookie;
pub mod distributed;
pub mod file;
pub mod locks;
pub mod memory;
pub mod session;

pub use cookie::*;
pub use distributed::*;
pub use file::FileCache;
pub use locks::KeyedLocks;
pub use memory::*;
pub use session::*;

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{ClientId, ObjectId, TenantId},
	error::ConfigError,
};

/// Boxed future returned by every [`CacheStore`] operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Key → blob storage contract implemented by every backing store.
///
/// Stores own versioning: every successful write stamps the entry with a fresh
/// [`EntryVersion`], which callers can hand back to [`compare_and_swap`](Self::compare_and_swap).
pub trait CacheStore
where
	Self: Send + Sync,
{
	/// Fetches the blob stored under `key`, if present and not expired.
	fn read<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<StoredBlob>>;

	/// Stores or replaces the blob under `key`, returning the new version.
	fn write<'a>(&'a self, key: &'a CacheKey, blob: CacheBlob) -> StoreFuture<'a, EntryVersion>;

	/// Stores the blob only if the current entry matches `expected`.
	///
	/// `expected = None` means "only if no entry exists".
	fn compare_and_swap<'a>(
		&'a self,
		key: &'a CacheKey,
		expected: Option<EntryVersion>,
		blob: CacheBlob,
	) -> StoreFuture<'a, CompareAndSwapOutcome>;

	/// Removes the entry under `key`, returning whether one existed.
	fn remove<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, bool>;
}

/// Result of a versioned write attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The entry matched the expectation and now carries the returned version.
	Updated(EntryVersion),
	/// An entry exists but its version differs from the expected one.
	VersionMismatch,
	/// A specific version was expected but no entry exists.
	Missing,
}
impl CompareAndSwapOutcome {
	/// Evaluates the outcome for a store whose current version is `current`.
	pub fn evaluate(current: Option<EntryVersion>, expected: Option<EntryVersion>) -> Option<Self> {
		match (current, expected) {
			(None, None) => None,
			(Some(cur), Some(exp)) if cur == exp => None,
			(None, Some(_)) => Some(Self::Missing),
			_ => Some(Self::VersionMismatch),
		}
	}
}

/// Error type produced by [`CacheStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Encoding failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Identifies whose serialized cache a store entry holds.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);
impl CacheKey {
	/// Suffix appended to the client identifier for the application-wide cache.
	pub const APP_CACHE_SUFFIX: &'static str = "_AppTokenCache";

	/// Wraps a raw key after validation.
	pub fn new(value: impl Into<String>) -> Result<Self, ConfigError> {
		let value = value.into();

		if value.is_empty() {
			return Err(ConfigError::InvalidCacheKey { reason: "key cannot be empty" });
		}
		if value.chars().any(char::is_whitespace) {
			return Err(ConfigError::InvalidCacheKey { reason: "key contains whitespace" });
		}

		Ok(Self(value))
	}

	/// Key of the application-wide (client credentials) cache: `{client_id}_AppTokenCache`.
	pub fn for_application(client_id: &ClientId) -> Self {
		Self(format!("{client_id}{}", Self::APP_CACHE_SUFFIX))
	}

	/// Key of a signed-in user's cache: `{object_id}.{tenant_id}`.
	pub fn for_user(object_id: &ObjectId, tenant_id: &TenantId) -> Self {
		Self(format!("{object_id}.{tenant_id}"))
	}

	/// Returns the key as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for CacheKey {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl From<CacheKey> for String {
	fn from(value: CacheKey) -> Self {
		value.0
	}
}
impl TryFrom<String> for CacheKey {
	type Error = ConfigError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl Debug for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "CacheKey({})", self.0)
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Opaque serialized token cache; contents are secret and never printed.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct CacheBlob(Vec<u8>);
impl CacheBlob {
	/// Wraps serialized bytes.
	pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
		Self(bytes.into())
	}

	/// Returns the raw bytes. Callers must avoid logging them.
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	/// Consumes the blob and returns the raw bytes.
	pub fn into_bytes(self) -> Vec<u8> {
		self.0
	}

	/// Byte length of the blob.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns true when the blob holds no bytes.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl From<Vec<u8>> for CacheBlob {
	fn from(value: Vec<u8>) -> Self {
		Self(value)
	}
}
impl Debug for CacheBlob {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "CacheBlob(<{} bytes redacted>)", self.0.len())
	}
}

/// Version stamp attached to a store entry on every write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryVersion(u64);
impl EntryVersion {
	/// Wraps a raw version value.
	pub const fn new(value: u64) -> Self {
		Self(value)
	}

	/// Returns the raw version value.
	pub const fn get(self) -> u64 {
		self.0
	}

	/// Issues a process-wide unique, strictly increasing version.
	///
	/// Versions are seeded from the wall clock so a restarted process does not reissue stamps
	/// that a shared store may still hold.
	pub fn next() -> Self {
		static LAST: AtomicU64 = AtomicU64::new(0);

		let now = u64::try_from(OffsetDateTime::now_utc().unix_timestamp_nanos()).unwrap_or(0);
		let previous = LAST
			.fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| Some(now.max(last + 1)))
			.unwrap_or_else(|last| last);

		Self(now.max(previous + 1))
	}
}

/// A blob read back from a store together with its version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredBlob {
	/// Serialized token cache.
	pub blob: CacheBlob,
	/// Version stamp of the entry.
	pub version: EntryVersion,
}
