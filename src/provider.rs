//! Cache-synchronization provider: keeps a [`TokenCache`] coherent with a [`CacheStore`].
//!
//! [`TokenCacheProvider::initialize`] wires three hooks into a cache. Before every access the
//! provider derives the cache key, loads the stored blob, and replaces the in-memory state with
//! it. After an access that changed state it writes the cache back under the same key. The
//! before-write hook is a no-op under [`ConcurrencyMode::LastWriteWins`] and a version check under
//! [`ConcurrencyMode::Optimistic`].
//!
//! Contexts without a resolvable key (no principal, or missing `oid`/`tid` claims) skip the store
//! entirely. Corrupt blobs are logged, discarded, and treated as a cache miss.

mod metrics;
mod options;
mod principal;

pub use metrics::ProviderMetrics;
pub use options::*;
pub use principal::*;

// self
use crate::{
	_prelude::*,
	auth::ClientId,
	cache::{
		CacheScope, NotificationFuture, TokenCache, TokenCacheNotificationArgs,
		TokenCacheNotifications,
	},
	obs::{self, HookKind, HookOutcome, HookSpan},
	store::{CacheKey, CacheStore, CompareAndSwapOutcome, StoredBlob},
};

/// Synchronizes token caches with a backing store.
///
/// Cloning is cheap; clones share the store, options, and metrics, and count as the same
/// provider for [`initialize`](Self::initialize) idempotency.
#[derive(Clone)]
pub struct TokenCacheProvider {
	core: Arc<ProviderCore>,
	app_hooks: Arc<ProviderHooks>,
	user_hooks: Arc<ProviderHooks>,
}
impl TokenCacheProvider {
	/// Creates a provider for `client_id` over `store`, resolving users through `principal`.
	pub fn new(
		store: Arc<dyn CacheStore>,
		client_id: ClientId,
		principal: Arc<dyn PrincipalAccessor>,
	) -> Self {
		Self::from_core(ProviderCore {
			store,
			client_id,
			principal,
			options: ProviderOptions::default(),
			metrics: Default::default(),
		})
	}

	/// Creates a provider that only serves the application-wide cache.
	pub fn for_application(store: Arc<dyn CacheStore>, client_id: ClientId) -> Self {
		Self::new(store, client_id, Arc::new(NoPrincipal))
	}

	fn from_core(core: ProviderCore) -> Self {
		let core = Arc::new(core);
		let app_hooks =
			Arc::new(ProviderHooks { core: core.clone(), scope: CacheScope::Application });
		let user_hooks = Arc::new(ProviderHooks { core: core.clone(), scope: CacheScope::User });

		Self { core, app_hooks, user_hooks }
	}

	/// Replaces the provider options.
	pub fn with_options(self, options: ProviderOptions) -> Self {
		let core = ProviderCore {
			store: self.core.store.clone(),
			client_id: self.core.client_id.clone(),
			principal: self.core.principal.clone(),
			options,
			metrics: self.core.metrics.clone(),
		};

		Self::from_core(core)
	}

	/// Active options.
	pub fn options(&self) -> &ProviderOptions {
		&self.core.options
	}

	/// Hook activity counters.
	pub fn metrics(&self) -> &ProviderMetrics {
		&self.core.metrics
	}

	/// Backing store.
	pub fn store(&self) -> &Arc<dyn CacheStore> {
		&self.core.store
	}

	/// Client whose caches this provider serves.
	pub fn client_id(&self) -> &ClientId {
		&self.core.client_id
	}

	/// Registers the before-access, after-access, and before-write hooks on `cache`.
	///
	/// Calling this again with the same provider and scope leaves the registration unchanged.
	/// No store operation is performed.
	pub fn initialize(&self, cache: &TokenCache, scope: CacheScope) {
		let hooks = self.hooks_for(scope);
		let registered = cache.notifications().is_some_and(|existing| {
			Arc::as_ptr(&existing).cast::<()>() == Arc::as_ptr(hooks).cast::<()>()
		});

		if registered {
			obs::debug_already_initialized(scope);

			return;
		}

		cache.set_notifications(hooks.clone());
	}

	/// Derives the cache key for `scope` from the client identifier or the current principal.
	///
	/// Returns `None` for user caches when no principal is available or its object/tenant claims
	/// are missing.
	pub fn cache_key(&self, scope: CacheScope) -> Option<CacheKey> {
		self.core.cache_key(scope)
	}

	/// Reloads the cache from the store before an access.
	pub async fn before_access(
		&self,
		args: &TokenCacheNotificationArgs,
		scope: CacheScope,
	) -> Result<()> {
		self.core.before_access(args, scope).await
	}

	/// Persists the cache after an access that changed state.
	pub async fn after_access(
		&self,
		args: &TokenCacheNotificationArgs,
		scope: CacheScope,
	) -> Result<()> {
		self.core.after_access(args, scope).await
	}

	/// Guards a mutation; see [`ConcurrencyMode`].
	pub async fn before_write(
		&self,
		args: &TokenCacheNotificationArgs,
		scope: CacheScope,
	) -> Result<()> {
		self.core.before_write(args, scope).await
	}

	/// Removes the store entry for the current key, returning whether one existed.
	pub async fn clear(&self, scope: CacheScope) -> Result<bool> {
		self.core.clear(scope).await
	}

	fn hooks_for(&self, scope: CacheScope) -> &Arc<ProviderHooks> {
		match scope {
			CacheScope::Application => &self.app_hooks,
			CacheScope::User => &self.user_hooks,
		}
	}
}
impl Debug for TokenCacheProvider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCacheProvider")
			.field("client_id", &self.core.client_id)
			.field("options", &self.core.options)
			.finish()
	}
}

struct ProviderCore {
	store: Arc<dyn CacheStore>,
	client_id: ClientId,
	principal: Arc<dyn PrincipalAccessor>,
	options: ProviderOptions,
	metrics: Arc<ProviderMetrics>,
}
impl ProviderCore {
	fn cache_key(&self, scope: CacheScope) -> Option<CacheKey> {
		match scope {
			CacheScope::Application => Some(CacheKey::for_application(&self.client_id)),
			CacheScope::User => {
				let principal = self.principal.current_principal()?;

				Some(CacheKey::for_user(&principal.object_id()?, &principal.tenant_id()?))
			},
		}
	}

	async fn before_access(
		&self,
		args: &TokenCacheNotificationArgs,
		scope: CacheScope,
	) -> Result<()> {
		const KIND: HookKind = HookKind::BeforeAccess;

		let span = HookSpan::new(KIND, scope);
		let result = span.instrument(self.load(args, scope)).await;

		record(KIND, result).map(|_| ())
	}

	async fn after_access(
		&self,
		args: &TokenCacheNotificationArgs,
		scope: CacheScope,
	) -> Result<()> {
		const KIND: HookKind = HookKind::AfterAccess;

		let span = HookSpan::new(KIND, scope);
		let result = span.instrument(self.persist(args, scope)).await;

		record(KIND, result).map(|_| ())
	}

	async fn before_write(
		&self,
		args: &TokenCacheNotificationArgs,
		scope: CacheScope,
	) -> Result<()> {
		const KIND: HookKind = HookKind::BeforeWrite;

		let span = HookSpan::new(KIND, scope);
		let result = span.instrument(self.check_version(args, scope)).await;

		record(KIND, result).map(|_| ())
	}

	async fn clear(&self, scope: CacheScope) -> Result<bool> {
		const KIND: HookKind = HookKind::Clear;

		let span = HookSpan::new(KIND, scope);
		let result = span.instrument(self.remove_entry(scope)).await;

		record(KIND, result).map(|outcome| outcome == HookOutcome::Removed)
	}

	async fn remove_entry(&self, scope: CacheScope) -> Result<HookOutcome> {
		let Some(key) = self.cache_key(scope) else {
			obs::debug_skipped(HookKind::Clear);

			return Ok(HookOutcome::Skipped);
		};

		if self.store.remove(&key).await? {
			self.metrics.record_removal();

			Ok(HookOutcome::Removed)
		} else {
			Ok(HookOutcome::Miss)
		}
	}

	async fn load(
		&self,
		args: &TokenCacheNotificationArgs,
		scope: CacheScope,
	) -> Result<HookOutcome> {
		let Some(key) = self.cache_key(scope) else {
			obs::debug_skipped(HookKind::BeforeAccess);

			return Ok(HookOutcome::Skipped);
		};
		let cache = &args.token_cache;
		let stored = match self.store.read(&key).await {
			Ok(stored) => stored,
			Err(e) => match self.options.read_failure {
				ReadFailurePolicy::FailOpen => {
					obs::warn_read_failed_open(&key, &e);
					self.metrics.record_read(false);
					cache.clear_in_memory();
					args.record_observed_version(None);

					return Ok(HookOutcome::FailOpen);
				},
				ReadFailurePolicy::Propagate => return Err(e.into()),
			},
		};
		let Some(StoredBlob { blob, version }) = stored else {
			self.metrics.record_read(false);
			cache.clear_in_memory();
			args.record_observed_version(None);

			return Ok(HookOutcome::Miss);
		};

		match cache.deserialize(&blob, true) {
			Ok(()) => {
				self.metrics.record_read(true);
				args.record_observed_version(Some(version));

				Ok(HookOutcome::Hit)
			},
			Err(e) => {
				obs::warn_corrupt_blob(&key, &e.message);
				self.metrics.record_read(false);
				self.metrics.record_corruption();
				cache.clear_in_memory();

				if let Err(e) = self.store.remove(&key).await {
					obs::warn_discard_failed(&key, &e);
				}

				args.record_observed_version(None);

				Ok(HookOutcome::Corrupt)
			},
		}
	}

	async fn persist(
		&self,
		args: &TokenCacheNotificationArgs,
		scope: CacheScope,
	) -> Result<HookOutcome> {
		if !args.has_state_changed {
			self.metrics.record_suppressed();

			return Ok(HookOutcome::Suppressed);
		}

		let Some(key) = self.cache_key(scope) else {
			obs::debug_skipped(HookKind::AfterAccess);

			return Ok(HookOutcome::Skipped);
		};
		let cache = &args.token_cache;

		// An emptied cache (e.g. after removing the only account) drops the entry.
		if cache.is_empty() {
			if self.store.remove(&key).await? {
				self.metrics.record_removal();
			}

			args.record_observed_version(None);

			return Ok(HookOutcome::Removed);
		}

		let blob = cache.serialize()?;
		let version = match self.options.concurrency {
			ConcurrencyMode::LastWriteWins => self.store.write(&key, blob).await?,
			ConcurrencyMode::Optimistic =>
				match self.store.compare_and_swap(&key, args.observed_version(), blob).await? {
					CompareAndSwapOutcome::Updated(version) => version,
					CompareAndSwapOutcome::VersionMismatch | CompareAndSwapOutcome::Missing =>
						return Err(self.conflict(HookKind::AfterAccess, key)),
				},
		};

		self.metrics.record_write();
		args.record_observed_version(Some(version));

		Ok(HookOutcome::Written)
	}

	async fn check_version(
		&self,
		args: &TokenCacheNotificationArgs,
		scope: CacheScope,
	) -> Result<HookOutcome> {
		if self.options.concurrency == ConcurrencyMode::LastWriteWins {
			return Ok(HookOutcome::Skipped);
		}

		let Some(key) = self.cache_key(scope) else {
			obs::debug_skipped(HookKind::BeforeWrite);

			return Ok(HookOutcome::Skipped);
		};
		let current = self.store.read(&key).await?.map(|stored| stored.version);

		if current != args.observed_version() {
			return Err(self.conflict(HookKind::BeforeWrite, key));
		}

		Ok(HookOutcome::Hit)
	}

	fn conflict(&self, kind: HookKind, key: CacheKey) -> Error {
		obs::warn_write_conflict(kind, &key);
		self.metrics.record_conflict();

		Error::WriteConflict { key }
	}
}

/// Registered hook set binding a provider to one cache scope.
struct ProviderHooks {
	core: Arc<ProviderCore>,
	scope: CacheScope,
}
impl TokenCacheNotifications for ProviderHooks {
	fn before_access<'a>(&'a self, args: &'a TokenCacheNotificationArgs) -> NotificationFuture<'a> {
		Box::pin(self.core.before_access(args, self.scope))
	}

	fn after_access<'a>(&'a self, args: &'a TokenCacheNotificationArgs) -> NotificationFuture<'a> {
		Box::pin(self.core.after_access(args, self.scope))
	}

	fn before_write<'a>(&'a self, args: &'a TokenCacheNotificationArgs) -> NotificationFuture<'a> {
		Box::pin(self.core.before_write(args, self.scope))
	}
}

fn record(kind: HookKind, result: Result<HookOutcome>) -> Result<HookOutcome> {
	let outcome = match &result {
		Ok(outcome) => *outcome,
		Err(Error::WriteConflict { .. }) => HookOutcome::Conflict,
		Err(_) => HookOutcome::Failure,
	};

	obs::record_hook_outcome(kind, outcome);

	result
}
