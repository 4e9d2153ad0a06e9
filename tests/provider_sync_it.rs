// std
use std::sync::atomic::{AtomicBool, Ordering};
// self
use token_cache_sync::{
	_preludet::*,
	cache::{CacheScope, CredentialKind, CredentialQuery, TokenCache},
	provider::{ConcurrencyMode, ProviderOptions, ReadFailurePolicy, TokenCacheProvider},
	store::{
		CacheBlob, CacheKey, CacheStore, CompareAndSwapOutcome, EntryVersion, MemoryStore,
		StoreError, StoreFuture, StoredBlob,
	},
};

/// Store whose reads always fail; writes and removals go to an in-memory store.
#[derive(Default)]
struct FailingReads {
	inner: MemoryStore,
}
impl CacheStore for FailingReads {
	fn read<'a>(&'a self, _key: &'a CacheKey) -> StoreFuture<'a, Option<StoredBlob>> {
		Box::pin(async { Err(StoreError::Backend { message: "connection reset".into() }) })
	}

	fn write<'a>(&'a self, key: &'a CacheKey, blob: CacheBlob) -> StoreFuture<'a, EntryVersion> {
		self.inner.write(key, blob)
	}

	fn compare_and_swap<'a>(
		&'a self,
		key: &'a CacheKey,
		expected: Option<EntryVersion>,
		blob: CacheBlob,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		self.inner.compare_and_swap(key, expected, blob)
	}

	fn remove<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, bool> {
		self.inner.remove(key)
	}
}

/// Store whose removals always fail; everything else goes to an in-memory store.
#[derive(Default)]
struct FailingRemoves {
	inner: MemoryStore,
}
impl CacheStore for FailingRemoves {
	fn read<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<StoredBlob>> {
		self.inner.read(key)
	}

	fn write<'a>(&'a self, key: &'a CacheKey, blob: CacheBlob) -> StoreFuture<'a, EntryVersion> {
		self.inner.write(key, blob)
	}

	fn compare_and_swap<'a>(
		&'a self,
		key: &'a CacheKey,
		expected: Option<EntryVersion>,
		blob: CacheBlob,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		self.inner.compare_and_swap(key, expected, blob)
	}

	fn remove<'a>(&'a self, _key: &'a CacheKey) -> StoreFuture<'a, bool> {
		Box::pin(async { Err(StoreError::Backend { message: "read-only replica".into() }) })
	}
}

/// Store that lets a rival instance write right after the next read completes.
#[derive(Default)]
struct RacingStore {
	inner: MemoryStore,
	armed: AtomicBool,
}
impl RacingStore {
	fn arm(&self) {
		self.armed.store(true, Ordering::SeqCst);
	}
}
impl CacheStore for RacingStore {
	fn read<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<StoredBlob>> {
		Box::pin(async move {
			let stored = self.inner.read(key).await?;

			if self.armed.swap(false, Ordering::SeqCst) {
				self.inner.write(key, CacheBlob::new(br#"{"AccessToken":{}}"#.to_vec())).await?;
			}

			Ok(stored)
		})
	}

	fn write<'a>(&'a self, key: &'a CacheKey, blob: CacheBlob) -> StoreFuture<'a, EntryVersion> {
		self.inner.write(key, blob)
	}

	fn compare_and_swap<'a>(
		&'a self,
		key: &'a CacheKey,
		expected: Option<EntryVersion>,
		blob: CacheBlob,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		self.inner.compare_and_swap(key, expected, blob)
	}

	fn remove<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, bool> {
		self.inner.remove(key)
	}
}

fn user_key() -> CacheKey {
	CacheKey::new("11.22").expect("User cache key fixture should be valid.")
}

fn user_cache(provider: &TokenCacheProvider) -> TokenCache {
	let cache = test_user_cache();

	provider.initialize(&cache, CacheScope::User);

	cache
}

fn access_query() -> CredentialQuery {
	CredentialQuery::new(CredentialKind::AccessToken, Some("11.22")).with_scopes(["User.Read"])
}

#[tokio::test]
async fn user_cache_follows_the_principal_across_requests() {
	let store = Arc::new(MemoryStore::default());
	let provider = build_test_provider(
		store.clone(),
		Some(test_principal("11", "22")),
		ProviderOptions::default(),
	);
	let first_request = user_cache(&provider);

	first_request
		.save_credentials(vec![test_access_token("11.22", "alice-at")])
		.await
		.expect("Saving alice's token should succeed.");

	assert!(
		store.read(&user_key()).await.expect("Reading the store should succeed.").is_some(),
		"Alice's cache should be persisted under `11.22`."
	);

	let second_request = user_cache(&provider);
	let found = second_request
		.find_credential(&access_query())
		.await
		.expect("Lookup should succeed.")
		.expect("Alice's token should be reloaded from the store.");

	assert_eq!(found.secret.expose(), "alice-at");
	assert_eq!(provider.metrics().hits(), 1);
	assert_eq!(provider.metrics().writes(), 1);
}

#[tokio::test]
async fn application_cache_uses_the_client_key() {
	let store = Arc::new(MemoryStore::default());
	let provider = TokenCacheProvider::for_application(store.clone(), test_client_id());
	let cache = TokenCache::application(test_client_id());

	provider.initialize(&cache, CacheScope::Application);
	cache
		.save_credentials(vec![test_access_token("app", "app-at")])
		.await
		.expect("Saving the application token should succeed.");

	let key = CacheKey::new(format!("{TEST_CLIENT_ID}_AppTokenCache"))
		.expect("Application key fixture should be valid.");

	assert!(store.read(&key).await.expect("Reading the store should succeed.").is_some());
}

#[tokio::test]
async fn anonymous_requests_never_touch_the_store() {
	let store = Arc::new(CountingStore::new(MemoryStore::default()));
	let provider = build_test_provider(store.clone(), None, ProviderOptions::default());
	let cache = user_cache(&provider);

	cache
		.save_credentials(vec![test_access_token("11.22", "at")])
		.await
		.expect("Saving without a principal should still succeed in memory.");

	let found = cache.find_credential(&access_query()).await.expect("Lookup should succeed.");

	assert!(found.is_some(), "The in-memory cache should keep serving the request.");
	assert_eq!(store.total(), 0);
}

#[tokio::test]
async fn principals_without_tenant_are_treated_as_anonymous() {
	let store = Arc::new(CountingStore::new(MemoryStore::default()));
	let principal = token_cache_sync::auth::ClaimsPrincipal::from_claims([("oid", "11")]);
	let provider = build_test_provider(store.clone(), Some(principal), ProviderOptions::default());
	let cache = user_cache(&provider);

	cache
		.save_credentials(vec![test_access_token("11.22", "at")])
		.await
		.expect("Saving should succeed.");

	assert_eq!(store.total(), 0);
}

#[tokio::test]
async fn unchanged_accesses_do_not_write_back() {
	let store = Arc::new(CountingStore::new(MemoryStore::default()));
	let provider = build_test_provider(
		store.clone(),
		Some(test_principal("11", "22")),
		ProviderOptions::default(),
	);
	let cache = user_cache(&provider);
	let token = test_access_token("11.22", "at");

	cache.save_credentials(vec![token.clone()]).await.expect("Saving should succeed.");

	assert_eq!(store.writes(), 1);

	for _ in 0..3 {
		cache.find_credential(&access_query()).await.expect("Lookup should succeed.");
	}

	// Saving an identical credential is not a state change either.
	cache.save_credentials(vec![token]).await.expect("Saving should succeed.");

	assert_eq!(store.writes(), 1);
	assert_eq!(store.reads(), 5);
	assert_eq!(provider.metrics().suppressed_writes(), 4);
}

#[tokio::test]
async fn removing_the_last_account_drops_the_entry() {
	let store = Arc::new(MemoryStore::default());
	let provider = build_test_provider(
		store.clone(),
		Some(test_principal("11", "22")),
		ProviderOptions::default(),
	);
	let cache = user_cache(&provider);

	cache
		.save_credentials(vec![test_access_token("11.22", "at")])
		.await
		.expect("Saving should succeed.");

	let removed =
		cache.remove_account("11.22").await.expect("Removing the account should succeed.");

	assert_eq!(removed, 1);
	assert!(store.read(&user_key()).await.expect("Reading the store should succeed.").is_none());
	assert_eq!(provider.metrics().removals(), 1);
}

#[tokio::test]
async fn clear_removes_the_current_entry_only() {
	let store = Arc::new(MemoryStore::default());
	let provider = build_test_provider(
		store.clone(),
		Some(test_principal("11", "22")),
		ProviderOptions::default(),
	);
	let other_key = CacheKey::new("33.44").expect("Cache key fixture should be valid.");

	store
		.write(&other_key, CacheBlob::new(b"{}".to_vec()))
		.await
		.expect("Seeding another user's entry should succeed.");
	user_cache(&provider)
		.save_credentials(vec![test_access_token("11.22", "at")])
		.await
		.expect("Saving should succeed.");

	assert!(provider.clear(CacheScope::User).await.expect("Clear should succeed."));
	assert!(!provider.clear(CacheScope::User).await.expect("Second clear should succeed."));
	assert!(store.read(&other_key).await.expect("Reading the store should succeed.").is_some());

	let anonymous = build_test_provider(store, None, ProviderOptions::default());

	assert!(!anonymous.clear(CacheScope::User).await.expect("Anonymous clear should succeed."));
}

#[tokio::test]
async fn corrupt_blobs_are_discarded_as_misses() {
	let store = Arc::new(MemoryStore::default());
	let provider = build_test_provider(
		store.clone(),
		Some(test_principal("11", "22")),
		ProviderOptions::default(),
	);

	store
		.write(&user_key(), CacheBlob::new(b"\x00not-json".to_vec()))
		.await
		.expect("Seeding a corrupt entry should succeed.");

	let found = user_cache(&provider)
		.find_credential(&access_query())
		.await
		.expect("A corrupt entry must not fail the access.");

	assert!(found.is_none());
	assert!(store.read(&user_key()).await.expect("Reading the store should succeed.").is_none());
	assert_eq!(provider.metrics().corruptions(), 1);

	user_cache(&provider)
		.save_credentials(vec![test_access_token("11.22", "fresh")])
		.await
		.expect("Saving after corruption should succeed.");

	assert!(store.read(&user_key()).await.expect("Reading the store should succeed.").is_some());
}

#[tokio::test]
async fn corrupt_blobs_stay_misses_when_removal_fails() {
	let store = Arc::new(FailingRemoves::default());
	let provider = build_test_provider(
		store.clone(),
		Some(test_principal("11", "22")),
		ProviderOptions::default(),
	);

	store
		.inner
		.write(&user_key(), CacheBlob::new(b"\x00not-json".to_vec()))
		.await
		.expect("Seeding a corrupt entry should succeed.");

	let found = user_cache(&provider)
		.find_credential(&access_query())
		.await
		.expect("A failed cleanup must not fail the access.");

	assert!(found.is_none());
	assert_eq!(provider.metrics().corruptions(), 1);
	assert!(store.read(&user_key()).await.expect("Reading the store should succeed.").is_some());
}

#[tokio::test]
async fn read_failures_fail_open_by_default() {
	let provider = build_test_provider(
		Arc::new(FailingReads::default()),
		Some(test_principal("11", "22")),
		ProviderOptions::default(),
	);
	let cache = user_cache(&provider);
	let found =
		cache.find_credential(&access_query()).await.expect("Fail-open reads should succeed.");

	assert!(found.is_none());
	assert_eq!(provider.metrics().misses(), 1);
}

#[tokio::test]
async fn read_failures_propagate_when_configured() {
	let provider = build_test_provider(
		Arc::new(FailingReads::default()),
		Some(test_principal("11", "22")),
		ProviderOptions::default().with_read_failure(ReadFailurePolicy::Propagate),
	);
	let err = user_cache(&provider)
		.find_credential(&access_query())
		.await
		.expect_err("Read failures should surface to the caller.");

	assert!(matches!(err, Error::Storage(StoreError::Backend { .. })), "{err:?}");
}

#[tokio::test]
async fn optimistic_mode_rejects_interleaved_writes() {
	let store = Arc::new(RacingStore::default());
	let provider = build_test_provider(
		store.clone(),
		Some(test_principal("11", "22")),
		ProviderOptions::default().with_concurrency(ConcurrencyMode::Optimistic),
	);
	let cache = user_cache(&provider);

	store.arm();

	let err = cache
		.save_credentials(vec![test_access_token("11.22", "at")])
		.await
		.expect_err("A rival write between load and write must be detected.");

	assert!(matches!(err, Error::WriteConflict { .. }), "{err:?}");
	assert!(cache.is_empty(), "The rejected mutation must not be applied.");
	assert_eq!(provider.metrics().conflicts(), 1);

	cache
		.save_credentials(vec![test_access_token("11.22", "at")])
		.await
		.expect("Retrying after reloading should succeed.");
}

#[tokio::test]
async fn last_write_wins_overwrites_interleaved_writes() {
	let store = Arc::new(RacingStore::default());
	let provider = build_test_provider(
		store.clone(),
		Some(test_principal("11", "22")),
		ProviderOptions::default(),
	);
	let cache = user_cache(&provider);

	store.arm();
	cache
		.save_credentials(vec![test_access_token("11.22", "at")])
		.await
		.expect("Last-write-wins saves should ignore rival writes.");

	let found = user_cache(&provider)
		.find_credential(&access_query())
		.await
		.expect("Lookup should succeed.");

	assert!(found.is_some());
	assert_eq!(provider.metrics().conflicts(), 0);
}

#[tokio::test]
async fn concurrent_instances_share_one_store() {
	let store = Arc::new(MemoryStore::default());
	let principal = test_principal("11", "22");
	let instance_a = build_test_provider(
		store.clone(),
		Some(principal.clone()),
		ProviderOptions::default(),
	);
	let instance_b = build_test_provider(store, Some(principal), ProviderOptions::default());
	let mut tasks = Vec::new();

	for (i, provider) in [instance_a.clone(), instance_b.clone()].into_iter().enumerate() {
		tasks.push(tokio::spawn(async move {
			user_cache(&provider)
				.save_credentials(vec![test_access_token("11.22", &format!("at-{i}"))])
				.await
		}));
	}

	for task in tasks {
		task.await.expect("Task should not panic.").expect("Concurrent saves should succeed.");
	}

	let found = user_cache(&instance_b)
		.find_credential(&access_query())
		.await
		.expect("Lookup should succeed.");

	assert!(found.is_some_and(|c| c.secret.expose().starts_with("at-")));
}
