//! Hook contract through which a token cache announces its accesses.

// self
use crate::{
	_prelude::*,
	auth::ClientId,
	cache::{CacheScope, TokenCache},
	store::EntryVersion,
};

/// Boxed future returned by [`TokenCacheNotifications`] hooks.
pub type NotificationFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + 'a + Send>>;

/// Hooks a token cache invokes around every access.
///
/// For a read access the cache calls `before_access` then `after_access`; for a write access it
/// calls `before_access`, `before_write`, mutates, then `after_access`. An error from any hook
/// aborts the access and is returned to the caller.
pub trait TokenCacheNotifications
where
	Self: Send + Sync,
{
	/// Runs before the cache is read or written.
	fn before_access<'a>(&'a self, args: &'a TokenCacheNotificationArgs) -> NotificationFuture<'a>;

	/// Runs after the access completed; `args.has_state_changed` reports whether it mutated.
	fn after_access<'a>(&'a self, args: &'a TokenCacheNotificationArgs) -> NotificationFuture<'a>;

	/// Runs before a mutation. Defaults to a no-op.
	fn before_write<'a>(&'a self, args: &'a TokenCacheNotificationArgs) -> NotificationFuture<'a> {
		let _ = args;

		Box::pin(async { Ok(()) })
	}
}

/// Context handed to every hook of one access.
#[derive(Debug)]
pub struct TokenCacheNotificationArgs {
	/// Handle to the cache being accessed.
	pub token_cache: TokenCache,
	/// Client that owns the cache.
	pub client_id: ClientId,
	/// Whether this is the application-wide or a per-user cache.
	pub scope: CacheScope,
	/// Set before `after_access` when the access mutated the cache.
	pub has_state_changed: bool,
	observed_version: Mutex<Option<EntryVersion>>,
}
impl TokenCacheNotificationArgs {
	pub(crate) fn new(token_cache: TokenCache) -> Self {
		Self {
			client_id: token_cache.client_id().clone(),
			scope: token_cache.scope(),
			token_cache,
			has_state_changed: false,
			observed_version: Mutex::new(None),
		}
	}

	/// Returns true for the application-wide cache.
	pub fn is_application_cache(&self) -> bool {
		matches!(self.scope, CacheScope::Application)
	}

	/// Version of the backing-store entry loaded during `before_access`, if any.
	pub fn observed_version(&self) -> Option<EntryVersion> {
		*self.observed_version.lock()
	}

	/// Records the version loaded (or written) for later hooks of the same access.
	pub fn record_observed_version(&self, version: Option<EntryVersion>) {
		*self.observed_version.lock() = version;
	}
}
