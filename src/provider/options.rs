//! Provider behavior switches.

// self
use crate::_prelude::*;

/// How `after_access` writes back to the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyMode {
	/// Unconditional writes; concurrent writers for one identity race and the last one wins.
	#[default]
	LastWriteWins,
	/// Writes are compare-and-swapped against the version loaded by `before_access`; a writer
	/// that lost the race gets [`Error::WriteConflict`](crate::error::Error::WriteConflict).
	Optimistic,
}

/// What `before_access` does when the store read fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadFailurePolicy {
	/// Log, clear the in-memory cache, and proceed as a cache miss.
	#[default]
	FailOpen,
	/// Return the store error to the caller.
	Propagate,
}

/// Options for [`TokenCacheProvider`](crate::provider::TokenCacheProvider).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOptions {
	/// Write-back strategy.
	pub concurrency: ConcurrencyMode,
	/// Store read failure handling.
	pub read_failure: ReadFailurePolicy,
}
impl ProviderOptions {
	/// Overrides the write-back strategy.
	pub fn with_concurrency(mut self, mode: ConcurrencyMode) -> Self {
		self.concurrency = mode;

		self
	}

	/// Overrides the read failure handling.
	pub fn with_read_failure(mut self, policy: ReadFailurePolicy) -> Self {
		self.read_failure = policy;

		self
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn options_load_from_config() {
		let options: ProviderOptions = serde_json::from_str(r#"{"concurrency":"optimistic"}"#)
			.expect("Options should deserialize.");

		assert_eq!(options.concurrency, ConcurrencyMode::Optimistic);
		assert_eq!(options.read_failure, ReadFailurePolicy::FailOpen);
	}
}
