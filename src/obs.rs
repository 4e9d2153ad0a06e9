//! Optional observability helpers for cache hooks and stores.
//!
//! # Feature Flags
//!
//! - Enable `tracing` (on by default) to wrap every hook in a span named `token_cache.hook` with
//!   `hook` and `scope` fields, and to emit warn-level events for corrupt blobs, fail-open reads,
//!   write conflicts, and oversized cookies.
//! - Enable `metrics` to increment the `token_cache_hook_total` counter for every hook outcome,
//!   labeled by `hook` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Provider hooks observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookKind {
	/// Reload from the backing store before the cache is read.
	BeforeAccess,
	/// Write back to the backing store after the cache is used.
	AfterAccess,
	/// Gate executed before the cache is mutated.
	BeforeWrite,
	/// Explicit removal of the backing-store entry.
	Clear,
}
impl HookKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			HookKind::BeforeAccess => "before_access",
			HookKind::AfterAccess => "after_access",
			HookKind::BeforeWrite => "before_write",
			HookKind::Clear => "clear",
		}
	}
}
impl Display for HookKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each hook invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HookOutcome {
	/// No cache key could be resolved; nothing was done.
	Skipped,
	/// A stored blob was loaded.
	Hit,
	/// No stored blob existed.
	Miss,
	/// The store read failed and the cache proceeded empty.
	FailOpen,
	/// A stored blob could not be decoded and was discarded.
	Corrupt,
	/// The in-memory cache was persisted.
	Written,
	/// The backing-store entry was removed.
	Removed,
	/// The access did not change state, so nothing was written.
	Suppressed,
	/// The entry advanced concurrently and the write was rejected.
	Conflict,
	/// The hook returned an error.
	Failure,
}
impl HookOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			HookOutcome::Skipped => "skipped",
			HookOutcome::Hit => "hit",
			HookOutcome::Miss => "miss",
			HookOutcome::FailOpen => "fail_open",
			HookOutcome::Corrupt => "corrupt",
			HookOutcome::Written => "written",
			HookOutcome::Removed => "removed",
			HookOutcome::Suppressed => "suppressed",
			HookOutcome::Conflict => "conflict",
			HookOutcome::Failure => "failure",
		}
	}
}
impl Display for HookOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
