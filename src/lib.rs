//! Keep an in-process OAuth token cache in sync with pluggable backing stores (memory,
//! distributed, session, and cookie) with CAS-aware write-back and per-key locking.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod cache;
pub mod error;
pub mod obs;
pub mod provider;
pub mod store;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::sync::atomic::{AtomicU64, Ordering};
	// self
	use crate::{
		auth::{ClaimsPrincipal, ClientId},
		cache::{Credential, CredentialKind, TokenCache},
		provider::{FixedPrincipal, PrincipalAccessor, ProviderOptions, TokenCacheProvider},
		store::{
			CacheKey, CacheStore, CompareAndSwapOutcome, EntryVersion, StoreFuture, StoredBlob,
		},
	};

	/// [`CacheStore`] wrapper that counts every operation forwarded to the inner store.
	#[derive(Debug, Default)]
	pub struct CountingStore<S> {
		inner: S,
		reads: AtomicU64,
		writes: AtomicU64,
		removes: AtomicU64,
	}
	impl<S> CountingStore<S>
	where
		S: CacheStore,
	{
		/// Wraps the provided store.
		pub fn new(inner: S) -> Self {
			Self {
				inner,
				reads: AtomicU64::new(0),
				writes: AtomicU64::new(0),
				removes: AtomicU64::new(0),
			}
		}

		/// Returns the wrapped store.
		pub fn inner(&self) -> &S {
			&self.inner
		}

		/// Number of `read` calls observed.
		pub fn reads(&self) -> u64 {
			self.reads.load(Ordering::Relaxed)
		}

		/// Number of `write` + `compare_and_swap` calls observed.
		pub fn writes(&self) -> u64 {
			self.writes.load(Ordering::Relaxed)
		}

		/// Number of `remove` calls observed.
		pub fn removes(&self) -> u64 {
			self.removes.load(Ordering::Relaxed)
		}

		/// Total number of operations observed.
		pub fn total(&self) -> u64 {
			self.reads() + self.writes() + self.removes()
		}
	}
	impl<S> CacheStore for CountingStore<S>
	where
		S: CacheStore,
	{
		fn read<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, Option<StoredBlob>> {
			self.reads.fetch_add(1, Ordering::Relaxed);

			self.inner.read(key)
		}

		fn write<'a>(
			&'a self,
			key: &'a CacheKey,
			blob: crate::store::CacheBlob,
		) -> StoreFuture<'a, EntryVersion> {
			self.writes.fetch_add(1, Ordering::Relaxed);

			self.inner.write(key, blob)
		}

		fn compare_and_swap<'a>(
			&'a self,
			key: &'a CacheKey,
			expected: Option<EntryVersion>,
			blob: crate::store::CacheBlob,
		) -> StoreFuture<'a, CompareAndSwapOutcome> {
			self.writes.fetch_add(1, Ordering::Relaxed);

			self.inner.compare_and_swap(key, expected, blob)
		}

		fn remove<'a>(&'a self, key: &'a CacheKey) -> StoreFuture<'a, bool> {
			self.removes.fetch_add(1, Ordering::Relaxed);

			self.inner.remove(key)
		}
	}

	/// Test client identifier shared by the integration suites.
	pub const TEST_CLIENT_ID: &str = "8f1c3e9a-client";

	/// Builds the shared test client identifier.
	pub fn test_client_id() -> ClientId {
		ClientId::new(TEST_CLIENT_ID).expect("Test client identifier should be valid.")
	}

	/// Builds a principal carrying the short `oid`/`tid` claims.
	pub fn test_principal(object_id: &str, tenant_id: &str) -> ClaimsPrincipal {
		ClaimsPrincipal::from_claims([("oid", object_id), ("tid", tenant_id)])
	}

	/// Builds a provider over the supplied store, optionally bound to a principal.
	pub fn build_test_provider(
		store: Arc<dyn CacheStore>,
		principal: Option<ClaimsPrincipal>,
		options: ProviderOptions,
	) -> Arc<TokenCacheProvider> {
		let accessor: Arc<dyn PrincipalAccessor> = Arc::new(FixedPrincipal::new(principal));

		Arc::new(TokenCacheProvider::new(store, test_client_id(), accessor).with_options(options))
	}

	/// Builds a user-scoped access token credential for the provided account.
	pub fn test_access_token(home_account_id: &str, secret: &str) -> Credential {
		Credential::builder(CredentialKind::AccessToken, TEST_CLIENT_ID)
			.home_account_id(home_account_id)
			.realm("common")
			.target("User.Read")
			.secret(secret)
			.expires_in(Duration::hours(1))
			.build()
			.expect("Access token fixture should build.")
	}

	/// Builds a fresh user token cache for the shared client identifier.
	pub fn test_user_cache() -> TokenCache {
		TokenCache::user(test_client_id())
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::{Mutex as AsyncMutex, RwLock as AsyncRwLock};
	pub use parking_lot::{Mutex, RwLock};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};

	pub use crate::error::{Error, Result};
}

#[cfg(test)] use tokio as _;
