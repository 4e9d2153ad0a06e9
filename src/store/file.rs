//! File-backed [`DistributedCache`] client for hosts that share a volume instead of a cache
//! service.

// std
use std::{
	fs::{self, File, OpenOptions},
	io::Write,
	path::{Path, PathBuf},
};
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use tempfile::NamedTempFile;
// self
use crate::{
	_prelude::*,
	store::{
		CacheBlob, CompareAndSwapOutcome, DistributedCache, DistributedEntryOptions, EntryVersion,
		StoreError, StoreFuture, StoredBlob,
	},
};

type Snapshot = HashMap<String, FileEntry>;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct FileEntry {
	value: String,
	version: EntryVersion,
	#[serde(with = "time::serde::timestamp::nanoseconds")]
	last_access: OffsetDateTime,
	#[serde(with = "time::serde::timestamp::nanoseconds::option")]
	absolute_deadline: Option<OffsetDateTime>,
	sliding: Option<Duration>,
}
impl FileEntry {
	fn new(
		value: &CacheBlob,
		options: &DistributedEntryOptions,
		now: OffsetDateTime,
	) -> (Self, EntryVersion) {
		let version = EntryVersion::next();
		let entry = Self {
			value: STANDARD.encode(value.as_bytes()),
			version,
			last_access: now,
			absolute_deadline: options.absolute_deadline(now),
			sliding: options.sliding_expiration,
		};

		(entry, version)
	}

	fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		if self.absolute_deadline.is_some_and(|deadline| now >= deadline) {
			return true;
		}

		self.sliding.is_some_and(|window| now - self.last_access > window)
	}

	fn decode(&self) -> Result<StoredBlob, StoreError> {
		let bytes = STANDARD.decode(&self.value).map_err(|e| StoreError::Serialization {
			message: format!("Failed to decode cached value: {e}"),
		})?;

		Ok(StoredBlob { blob: CacheBlob::new(bytes), version: self.version })
	}
}

/// Shares cache entries through a JSON snapshot on disk.
///
/// Every operation takes an exclusive advisory lock on a `.lock` file next to the snapshot,
/// reloads the snapshot, and replaces it atomically (unique temp file + rename) before releasing
/// the lock. Handles in one process and handles in other processes therefore see each other's
/// writes and never drop entries written under other keys.
///
/// Operations block the calling thread on file I/O and on the lock.
#[derive(Clone, Debug)]
pub struct FileCache {
	path: PathBuf,
	lock_path: PathBuf,
}
impl FileCache {
	/// Opens (or creates) a cache at the provided path, validating any existing snapshot.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();
		let mut lock_path = path.clone().into_os_string();

		lock_path.push(".lock");

		let cache = Self { path, lock_path: lock_path.into() };

		Self::ensure_parent_exists(&cache.path)?;

		let _lock = cache.lock()?;

		Self::load_snapshot(&cache.path)?;

		Ok(cache)
	}

	/// Location of the snapshot file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Location of the advisory lock file.
	pub fn lock_path(&self) -> &Path {
		&self.lock_path
	}

	fn lock(&self) -> Result<File, StoreError> {
		let file = OpenOptions::new()
			.create(true)
			.truncate(false)
			.write(true)
			.open(&self.lock_path)
			.map_err(|e| StoreError::Backend {
				message: format!("Failed to open {}: {e}", self.lock_path.display()),
			})?;

		file.lock().map_err(|e| StoreError::Backend {
			message: format!("Failed to lock {}: {e}", self.lock_path.display()),
		})?;

		Ok(file)
	}

	fn load_snapshot(path: &Path) -> Result<Snapshot, StoreError> {
		if !path.exists() {
			return Ok(HashMap::new());
		}

		let metadata = path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create cache directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized =
			serde_json::to_vec_pretty(snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize cache snapshot: {e}"),
			})?;
		let dir =
			self.path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
		let mut tmp = NamedTempFile::new_in(dir).map_err(|e| StoreError::Backend {
			message: format!("Failed to create a temp file in {}: {e}", dir.display()),
		})?;

		tmp.write_all(&serialized).map_err(|e| StoreError::Backend {
			message: format!("Failed to write {}: {e}", tmp.path().display()),
		})?;
		tmp.as_file().sync_all().map_err(|e| StoreError::Backend {
			message: format!("Failed to sync {}: {e}", tmp.path().display()),
		})?;
		tmp.persist(&self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {}", self.path.display(), e.error),
		})?;

		Ok(())
	}

	/// Locks the snapshot, loads it, applies `op`, and persists when `op` reports a change.
	fn transact<T>(
		&self,
		op: impl FnOnce(&mut Snapshot) -> Result<(T, bool), StoreError>,
	) -> Result<T, StoreError> {
		let _lock = self.lock()?;
		let mut snapshot = Self::load_snapshot(&self.path)?;
		let (value, dirty) = op(&mut snapshot)?;

		if dirty {
			self.persist(&snapshot)?;
		}

		Ok(value)
	}

	/// Drops expired entries, returning true if any were removed.
	fn evict_expired(snapshot: &mut Snapshot, now: OffsetDateTime) -> bool {
		let before = snapshot.len();

		snapshot.retain(|_, entry| !entry.is_expired_at(now));

		before != snapshot.len()
	}

	pub(crate) fn get_at(
		&self,
		key: &str,
		now: OffsetDateTime,
	) -> Result<Option<StoredBlob>, StoreError> {
		self.transact(|snapshot| {
			let evicted = Self::evict_expired(snapshot, now);
			let stored = snapshot.get(key).map(FileEntry::decode).transpose()?;

			Ok((stored, evicted))
		})
	}

	pub(crate) fn set_at(
		&self,
		key: &str,
		value: &CacheBlob,
		options: &DistributedEntryOptions,
		now: OffsetDateTime,
	) -> Result<EntryVersion, StoreError> {
		self.transact(|snapshot| {
			Self::evict_expired(snapshot, now);

			let (entry, version) = FileEntry::new(value, options, now);

			snapshot.insert(key.to_owned(), entry);

			Ok((version, true))
		})
	}

	pub(crate) fn set_if_version_at(
		&self,
		key: &str,
		expected: Option<EntryVersion>,
		value: &CacheBlob,
		options: &DistributedEntryOptions,
		now: OffsetDateTime,
	) -> Result<CompareAndSwapOutcome, StoreError> {
		self.transact(|snapshot| {
			let evicted = Self::evict_expired(snapshot, now);
			let current = snapshot.get(key).map(|entry| entry.version);

			if let Some(rejected) = CompareAndSwapOutcome::evaluate(current, expected) {
				return Ok((rejected, evicted));
			}

			let (entry, version) = FileEntry::new(value, options, now);

			snapshot.insert(key.to_owned(), entry);

			Ok((CompareAndSwapOutcome::Updated(version), true))
		})
	}

	fn remove_now(&self, key: &str) -> Result<bool, StoreError> {
		self.transact(|snapshot| {
			let removed = snapshot.remove(key).is_some();

			Ok((removed, removed))
		})
	}

	pub(crate) fn refresh_at(&self, key: &str, now: OffsetDateTime) -> Result<bool, StoreError> {
		self.transact(|snapshot| {
			let evicted = Self::evict_expired(snapshot, now);

			match snapshot.get_mut(key) {
				Some(entry) if entry.sliding.is_some() => {
					entry.last_access = now;

					Ok((true, true))
				},
				Some(_) => Ok((true, evicted)),
				None => Ok((false, evicted)),
			}
		})
	}
}
impl DistributedCache for FileCache {
	fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<StoredBlob>> {
		Box::pin(async move { self.get_at(key, OffsetDateTime::now_utc()) })
	}

	fn set<'a>(
		&'a self,
		key: &'a str,
		value: CacheBlob,
		options: &'a DistributedEntryOptions,
	) -> StoreFuture<'a, EntryVersion> {
		Box::pin(async move { self.set_at(key, &value, options, OffsetDateTime::now_utc()) })
	}

	fn set_if_version<'a>(
		&'a self,
		key: &'a str,
		expected: Option<EntryVersion>,
		value: CacheBlob,
		options: &'a DistributedEntryOptions,
	) -> StoreFuture<'a, CompareAndSwapOutcome> {
		Box::pin(async move {
			self.set_if_version_at(key, expected, &value, options, OffsetDateTime::now_utc())
		})
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
		Box::pin(async move { self.remove_now(key) })
	}

	fn refresh<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
		Box::pin(async move { self.refresh_at(key, OffsetDateTime::now_utc()) })
	}
}
