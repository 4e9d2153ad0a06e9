//! [`CacheStore`] that ships each serialized cache to the browser inside a cookie.
//!
//! Browsers cap cookie sizes (commonly around 4 KiB per cookie); this store does not split or
//! reject large values and only logs a warning when a value crosses that size.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	obs,
	store::{
		CacheBlob, CacheKey, CacheStore, CompareAndSwapOutcome, EntryVersion, StoreError,
		StoreFuture, StoredBlob,
	},
};

/// Encoded length above which browsers commonly drop a cookie.
pub const COOKIE_SIZE_WARNING: usize = 4096;

/// Request/response cookie access, as exposed by the host's HTTP layer.
pub trait CookieJar
where
	Self: Send + Sync,
{
	/// Returns the value of the named request cookie.
	fn get(&self, name: &str) -> Option<String>;

	/// Appends a response cookie.
	fn set(&self, name: &str, value: String);

	/// Expires the named cookie, returning whether it was present.
	fn delete(&self, name: &str) -> bool;
}

/// In-process [`CookieJar`] for tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryCookieJar(Arc<RwLock<BTreeMap<String, String>>>);
impl MemoryCookieJar {
	/// Returns the names of all cookies in the jar.
	pub fn names(&self) -> Vec<String> {
		self.0.read().keys().cloned().collect()
	}
}
impl CookieJar for MemoryCookieJar {
	fn get(&self, name: &str) -> Option<String> {
		self.0.read().get(name).cloned()
	}

	fn set(&self, name: &str, value: String) {
		self.0.write().insert(name.to_owned(), value);
	}

	fn delete(&self, name: &str) -> bool {
		self.0.write().remove(name).is_some()
	}
}

/// Options for [`CookieStore`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieStoreOptions {
	/// Prefix prepended to the cache key to form the cookie name.
	pub name_prefix: String,
}
impl CookieStoreOptions {
	/// Default cookie name prefix.
	pub const DEFAULT_NAME_PREFIX: &'static str = ".TokenCache.";

	/// Overrides the cookie name prefix.
	pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.name_prefix = prefix.into();

		self
	}

	/// Rejects prefixes that cannot appear in a cookie name.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let invalid = |c: char| {
			c.is_whitespace() || c.is_control() || "()<>@,;:\\\"/[]?={}".contains(c)
		};

		if self.name_prefix.chars().any(invalid) {
			return Err(ConfigError::InvalidOption {
				option: "name_prefix",
				reason: "contains characters not allowed in cookie names",
			});
		}

		Ok(())
	}
}
impl Default for CookieStoreOptions {
	fn default() -> Self {
		Self { name_prefix: Self::DEFAULT_NAME_PREFIX.into() }
	}
}

/// Cookie-backed store; the blob lives client-side and travels with every request.
///
/// There is no server-side version counter, so an entry's version is derived from the SHA-256
/// digest of its contents.
#[derive(Clone)]
pub struct CookieStore {
	jar: Arc<dyn CookieJar>,
	options: CookieStoreOptions,
}
impl CookieStore {
	/// Builds a store over one request's cookie jar.
	pub fn new(jar: Arc<dyn CookieJar>, options: CookieStoreOptions) -> Result<Self, ConfigError> {
		options.validate()?;

		Ok(Self { jar, options })
	}

	/// Cookie name used for `key`.
	pub fn cookie_name(&self, key: &CacheKey) -> String {
		format!("{}{key}", self.options.name_prefix)
	}

	/// Version derived from the blob contents.
	pub fn content_version(blob: &CacheBlob) -> EntryVersion {
		let digest = Sha256::digest(blob.as_bytes());
		let mut prefix = [0_u8; 8];

		prefix.copy_from_slice(&digest[..8]);

		EntryVersion::new(u64::from_be_bytes(prefix))
	}

	fn current(&self, key: &CacheKey) -> Result<Option<StoredBlob>, StoreError> {
		let Some(encoded) = self.jar.get(&self.cookie_name(key)) else {
			return Ok(None);
		};
		let bytes =
			URL_SAFE_NO_PAD.decode(encoded.as_bytes()).map_err(|e| StoreError::Serialization {
				message: format!("Failed to decode token cache cookie: {e}"),
			})?;
		let blob = CacheBlob::new(bytes);
		let version = Self::content_version(&blob);

		Ok(Some(StoredBlob { blob, version }))
	}

	fn store_now(&self, key: &CacheKey, blob: &CacheBlob) -> EntryVersion {
		let encoded = URL_SAFE_NO_PAD.encode(blob.as_bytes());

		if encoded.len() > COOKIE_SIZE_WARNING {
			obs::warn_oversized_cookie(key, encoded.len(), COOKIE_SIZE_WARNING);
		}

		self.jar.set(&self.cookie_name(key), encoded);

		Self::content_version(blob)
	}
}
impl Debug for CookieStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CookieStore").field("options", &self.options).finish()
	}
}
impl CacheStore for CookieStore {
	fn read<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<StoredBlob>> {
		Box::pin(async move { self.current(key) })
	}

	fn write<'a>(&'a self, key: &'a CacheKey, blob: CacheBlob) -> StoreFuture<'a, EntryVersion> {
		Box::pin(async move { Ok(self.store_now(key, &blob)) })
	}

	fn compare_and_swap<'a>(
		&'a self,
		key: &'a CacheKey,
		expected: Option<EntryVersion>,
		blob: CacheBlob,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move {
			let current = self.current(key)?.map(|stored| stored.version);

			if let Some(rejected) = CompareAndSwapOutcome::evaluate(current, expected) {
				return Ok(rejected);
			}

			Ok(CompareAndSwapOutcome::Updated(self.store_now(key, &blob)))
		})
	}

	fn remove<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, bool> {
		Box::pin(async move { Ok(self.jar.delete(&self.cookie_name(key))) })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn key() -> CacheKey {
		CacheKey::new("11.22").expect("Cache key fixture should be valid.")
	}

	fn store(jar: &MemoryCookieJar) -> CookieStore {
		CookieStore::new(Arc::new(jar.clone()), CookieStoreOptions::default())
			.expect("Default cookie options should validate.")
	}

	#[test]
	fn cookie_names_use_the_prefix() {
		let jar = MemoryCookieJar::default();

		assert_eq!(store(&jar).cookie_name(&key()), ".TokenCache.11.22");
		assert!(CookieStoreOptions::default().with_name_prefix("bad name").validate().is_err());
	}

	#[tokio::test]
	async fn values_are_url_safe_base64() {
		let jar = MemoryCookieJar::default();
		let store = store(&jar);

		store
			.write(&key(), CacheBlob::new(vec![0xfb, 0xff, 0xfe]))
			.await
			.expect("Cookie write should succeed.");

		assert_eq!(jar.get(".TokenCache.11.22").as_deref(), Some("-__-"));
	}

	#[tokio::test]
	async fn identical_contents_share_a_version() {
		let jar = MemoryCookieJar::default();
		let store = store(&jar);
		let blob = CacheBlob::new(b"blob".to_vec());
		let written =
			store.write(&key(), blob.clone()).await.expect("Cookie write should succeed.");

		assert_eq!(written, CookieStore::content_version(&blob));
		assert_ne!(written, CookieStore::content_version(&CacheBlob::new(b"other".to_vec())));
	}

	#[tokio::test]
	async fn tampered_cookies_are_serialization_errors() {
		let jar = MemoryCookieJar::default();

		jar.set(".TokenCache.11.22", "not base64!".into());

		assert!(matches!(store(&jar).read(&key()).await, Err(StoreError::Serialization { .. })));
	}
}
