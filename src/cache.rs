//! In-memory token cache owned by the token-acquisition side.
//!
//! [`TokenCache`] is the object the synchronization layer keeps coherent with a backing store. It
//! does not acquire tokens; it holds credentials, serializes to an opaque [`CacheBlob`], and runs
//! the registered [`TokenCacheNotifications`] around every access so a provider can reload state
//! before the access and persist it afterwards.

pub mod credential;
pub mod notification;
pub mod state;

pub use credential::*;
pub use notification::*;
pub use state::*;

// self
use crate::{
	_prelude::*,
	auth::ClientId,
	error::{CacheCorruptionError, ConfigError},
	store::{CacheBlob, StoreError},
};

/// Whose tokens a cache holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheScope {
	/// Application-only tokens (client credentials).
	Application,
	/// Tokens of one signed-in user.
	User,
}
impl CacheScope {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CacheScope::Application => "application",
			CacheScope::User => "user",
		}
	}
}
impl Display for CacheScope {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

struct TokenCacheInner {
	client_id: ClientId,
	scope: CacheScope,
	state: Mutex<CacheState>,
	notifications: RwLock<Option<Arc<dyn TokenCacheNotifications>>>,
	access_guard: AsyncMutex<()>,
}

/// Cheap-to-clone handle to an in-memory token cache.
///
/// Accesses through one handle (and its clones) are serialized, so the before/after hooks of
/// one access never interleave with another's.
#[derive(Clone)]
pub struct TokenCache(Arc<TokenCacheInner>);
impl TokenCache {
	/// Creates the application-wide cache for `client_id`.
	pub fn application(client_id: ClientId) -> Self {
		Self::with_scope(client_id, CacheScope::Application)
	}

	/// Creates a per-user cache for `client_id`.
	pub fn user(client_id: ClientId) -> Self {
		Self::with_scope(client_id, CacheScope::User)
	}

	fn with_scope(client_id: ClientId, scope: CacheScope) -> Self {
		Self(Arc::new(TokenCacheInner {
			client_id,
			scope,
			state: Mutex::new(CacheState::default()),
			notifications: RwLock::new(None),
			access_guard: AsyncMutex::new(()),
		}))
	}

	/// Client that owns the cache.
	pub fn client_id(&self) -> &ClientId {
		&self.0.client_id
	}

	/// Whose tokens the cache holds.
	pub fn scope(&self) -> CacheScope {
		self.0.scope
	}

	/// Returns true if both handles point to the same cache.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Arc::ptr_eq(&self.0, &other.0)
	}

	/// Registers (or replaces) the hook set invoked around every access.
	pub fn set_notifications(&self, notifications: Arc<dyn TokenCacheNotifications>) {
		*self.0.notifications.write() = Some(notifications);
	}

	/// Returns the registered hook set.
	pub fn notifications(&self) -> Option<Arc<dyn TokenCacheNotifications>> {
		self.0.notifications.read().clone()
	}

	/// Returns true once a hook set is registered.
	pub fn has_notifications(&self) -> bool {
		self.0.notifications.read().is_some()
	}

	/// Serializes the in-memory state.
	pub fn serialize(&self) -> Result<CacheBlob> {
		self.0.state.lock().to_blob().map_err(|e| {
			StoreError::Serialization { message: format!("Failed to serialize token cache: {e}") }
				.into()
		})
	}

	/// Loads a serialized state.
	///
	/// With `clear_existing` the blob replaces the in-memory state; otherwise its credentials are
	/// merged over the current ones. On error the in-memory state is left untouched.
	pub fn deserialize(
		&self,
		blob: &CacheBlob,
		clear_existing: bool,
	) -> Result<(), CacheCorruptionError> {
		let incoming = CacheState::from_blob(blob)?;
		let mut state = self.0.state.lock();

		if clear_existing {
			*state = incoming;
		} else {
			for credential in incoming.credentials().cloned() {
				state.upsert(credential);
			}
		}

		Ok(())
	}

	/// Drops every in-memory credential without touching any hook.
	pub fn clear_in_memory(&self) {
		*self.0.state.lock() = CacheState::default();
	}

	/// Snapshot of the in-memory state, without running hooks.
	pub fn snapshot(&self) -> CacheState {
		self.0.state.lock().clone()
	}

	/// Number of in-memory credentials, without running hooks.
	pub fn len(&self) -> usize {
		self.0.state.lock().len()
	}

	/// Returns true when no credentials are held in memory.
	pub fn is_empty(&self) -> bool {
		self.0.state.lock().is_empty()
	}

	/// Read access: finds a credential matching `query`.
	pub async fn find_credential(&self, query: &CredentialQuery) -> Result<Option<Credential>> {
		self.access(false, |state| (state.find(query).cloned(), false)).await
	}

	/// Write access: inserts or replaces credentials.
	pub async fn save_credentials(&self, credentials: Vec<Credential>) -> Result<()> {
		self.access(true, |state| {
			let changed =
				credentials.into_iter().fold(false, |changed, c| state.upsert(c) || changed);

			((), changed)
		})
		.await
	}

	/// Write access: removes an account's credentials, returning how many were removed.
	pub async fn remove_account(&self, home_account_id: &str) -> Result<usize> {
		if home_account_id.is_empty() {
			return Err(ConfigError::InvalidOption {
				option: "home_account_id",
				reason: "cannot be empty",
			}
			.into());
		}

		self.access(true, |state| {
			let removed = state.remove_account(home_account_id);

			(removed, removed > 0)
		})
		.await
	}

	async fn access<T>(
		&self,
		write: bool,
		op: impl FnOnce(&mut CacheState) -> (T,
		bool),
	) -> Result<T> {
		let _serialized = self.0.access_guard.lock().await;
		let notifications = self.notifications();
		let mut args = TokenCacheNotificationArgs::new(self.clone());

		if let Some(hooks) = &notifications {
			hooks.before_access(&args).await?;

			if write {
				hooks.before_write(&args).await?;
			}
		}

		let (value, changed) = op(&mut *self.0.state.lock());

		args.has_state_changed = changed;

		if let Some(hooks) = &notifications {
			hooks.after_access(&args).await?;
		}

		Ok(value)
	}
}
impl Debug for TokenCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCache")
			.field("client_id", &self.0.client_id)
			.field("scope", &self.0.scope)
			.field("credentials", &self.len())
			.field("has_notifications", &self.has_notifications())
			.finish()
	}
}
