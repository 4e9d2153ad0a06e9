//! Crate-level error types shared across the cache model, providers, and stores.

// self
use crate::{_prelude::*, store::CacheKey};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// A serialized cache blob could not be decoded.
	#[error(transparent)]
	Corruption(#[from] CacheCorruptionError),

	/// The backing-store entry advanced since it was loaded; the write was rejected.
	#[error("Token cache entry `{key}` was modified concurrently.")]
	WriteConflict {
		/// Key whose entry changed underneath the writer.
		key: CacheKey,
	},
}

/// Configuration and validation failures.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum ConfigError {
	/// An identifier failed validation.
	#[error(transparent)]
	InvalidIdentifier(#[from] crate::auth::IdentifierError),
	/// A cache key failed validation.
	#[error("Cache key is invalid: {reason}.")]
	InvalidCacheKey {
		/// Validation failure description.
		reason: &'static str,
	},
	/// An option value is outside its supported range.
	#[error("Option `{option}` is invalid: {reason}.")]
	InvalidOption {
		/// Name of the offending option.
		option: &'static str,
		/// Validation failure description.
		reason: &'static str,
	},
	/// Credential builder validation failed.
	#[error("Unable to build credential.")]
	CredentialBuild(#[from] crate::cache::CredentialBuilderError),
}

/// Raised when a serialized token cache cannot be decoded.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Token cache blob is corrupt: {message}.")]
pub struct CacheCorruptionError {
	/// Decoder message, including the JSON path of the failure when known.
	pub message: String,
}
impl CacheCorruptionError {
	/// Builds the error from a path-aware JSON decoding failure.
	pub fn from_json(e: serde_path_to_error::Error<serde_json::Error>) -> Self {
		let path = e.path().to_string();
		let inner = e.into_inner();
		let message = if path == "." { inner.to_string() } else { format!("{path}: {inner}") };

		Self { message }
	}
}
