// self
use crate::{
	_prelude::*,
	cache::CacheScope,
	obs::HookKind,
	store::{CacheKey, StoreError},
};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedHook<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedHook<F> = F;

/// A span builder used by provider hooks.
#[derive(Clone, Debug)]
pub struct HookSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl HookSpan {
	/// Creates a new span tagged with the provided hook kind + cache scope.
	pub fn new(kind: HookKind, scope: CacheScope) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::debug_span!(
				"token_cache.hook",
				hook = kind.as_str(),
				scope = scope.as_str()
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, scope);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedHook<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Logs that a hook had no cache key to work with.
pub fn debug_skipped(kind: HookKind) {
	#[cfg(feature = "tracing")]
	tracing::debug!(hook = kind.as_str(), "No cache key resolved; skipping backing store.");
	#[cfg(not(feature = "tracing"))]
	let _ = kind;
}

/// Logs a re-initialization of an already wired cache.
pub fn debug_already_initialized(scope: CacheScope) {
	#[cfg(feature = "tracing")]
	tracing::debug!(scope = scope.as_str(), "Token cache already initialized by this provider.");
	#[cfg(not(feature = "tracing"))]
	let _ = scope;
}

/// Logs a discarded blob that failed to decode.
pub fn warn_corrupt_blob(key: &CacheKey, message: &str) {
	#[cfg(feature = "tracing")]
	tracing::warn!(key = key.as_str(), error = message, "Discarding corrupt token cache entry.");
	#[cfg(not(feature = "tracing"))]
	let _ = (key, message);
}

/// Logs a corrupt entry that stayed in the store because removing it failed.
pub fn warn_discard_failed(key: &CacheKey, error: &StoreError) {
	#[cfg(feature = "tracing")]
	tracing::warn!(key = key.as_str(), %error, "Failed to remove corrupt token cache entry.");
	#[cfg(not(feature = "tracing"))]
	let _ = (key, error);
}

/// Logs a store read failure that the provider treated as a cache miss.
pub fn warn_read_failed_open(key: &CacheKey, error: &StoreError) {
	#[cfg(feature = "tracing")]
	tracing::warn!(
		key = key.as_str(),
		%error,
		"Token cache read failed; continuing with an empty cache."
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (key, error);
}

/// Logs a rejected optimistic write.
pub fn warn_write_conflict(kind: HookKind, key: &CacheKey) {
	#[cfg(feature = "tracing")]
	tracing::warn!(
		hook = kind.as_str(),
		key = key.as_str(),
		"Token cache entry changed concurrently."
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (kind, key);
}

/// Logs a cookie value larger than browsers reliably accept.
pub fn warn_oversized_cookie(key: &CacheKey, len: usize, limit: usize) {
	#[cfg(feature = "tracing")]
	tracing::warn!(
		key = key.as_str(),
		len,
		limit,
		"Token cache cookie exceeds the common browser limit."
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (key, len, limit);
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn event_helpers_are_safe_without_subscriber() {
		let key = CacheKey::new("11.22").expect("Cache key fixture should be valid.");

		debug_skipped(HookKind::BeforeAccess);
		warn_corrupt_blob(&key, "bad json");
		warn_discard_failed(&key, &StoreError::Backend { message: "offline".into() });
		warn_oversized_cookie(&key, 5000, 4096);
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = HookSpan::new(HookKind::AfterAccess, CacheScope::User);
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
