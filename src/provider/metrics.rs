// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for provider hook activity.
#[derive(Debug, Default)]
pub struct ProviderMetrics {
	reads: AtomicU64,
	hits: AtomicU64,
	misses: AtomicU64,
	writes: AtomicU64,
	suppressed: AtomicU64,
	removals: AtomicU64,
	corruptions: AtomicU64,
	conflicts: AtomicU64,
}
impl ProviderMetrics {
	/// Returns the number of backing-store reads issued by `before_access`.
	pub fn reads(&self) -> u64 {
		self.reads.load(Ordering::Relaxed)
	}

	/// Returns the number of reads that loaded a blob.
	pub fn hits(&self) -> u64 {
		self.hits.load(Ordering::Relaxed)
	}

	/// Returns the number of reads that found nothing (including fail-open reads).
	pub fn misses(&self) -> u64 {
		self.misses.load(Ordering::Relaxed)
	}

	/// Returns the number of blobs written back.
	pub fn writes(&self) -> u64 {
		self.writes.load(Ordering::Relaxed)
	}

	/// Returns the number of `after_access` calls skipped because nothing changed.
	pub fn suppressed_writes(&self) -> u64 {
		self.suppressed.load(Ordering::Relaxed)
	}

	/// Returns the number of entries removed.
	pub fn removals(&self) -> u64 {
		self.removals.load(Ordering::Relaxed)
	}

	/// Returns the number of corrupt blobs discarded.
	pub fn corruptions(&self) -> u64 {
		self.corruptions.load(Ordering::Relaxed)
	}

	/// Returns the number of rejected optimistic writes.
	pub fn conflicts(&self) -> u64 {
		self.conflicts.load(Ordering::Relaxed)
	}

	pub(crate) fn record_read(&self, hit: bool) {
		self.reads.fetch_add(1, Ordering::Relaxed);

		if hit {
			self.hits.fetch_add(1, Ordering::Relaxed);
		} else {
			self.misses.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub(crate) fn record_write(&self) {
		self.writes.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_suppressed(&self) {
		self.suppressed.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_removal(&self) {
		self.removals.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_corruption(&self) {
		self.corruptions.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_conflict(&self) {
		self.conflicts.fetch_add(1, Ordering::Relaxed);
	}
}
