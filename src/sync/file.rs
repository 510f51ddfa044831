//! File-lock-based store backend.
//!
//! The shared store is a directory holding two files:
//!
//! ```text
//! <dir>/sync.lock      - empty file carrying the advisory lock
//! <dir>/boundary.json  - versioned document with the persisted boundary
//! ```
//!
//! Mutual exclusion uses `flock(LOCK_EX | LOCK_NB)`, polled with jitter up
//! to a bounded timeout. Stale-lock recovery policy: the lock is an OS
//! advisory lock, released automatically when the holding process dies, so
//! a crashed holder never wedges the store and no manual staleness check is
//! needed. A timeout therefore means a *live* holder.
//!
//! The boundary document is written atomically: serialized to a temporary
//! file in the same directory, flushed to disk, renamed over the state
//! file, and sealed with an fsync of the directory so the rename itself
//! survives power loss. A crash mid-write leaves the previous document
//! intact.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::sync::{HandleState, TimestampSynchronizer};
use crate::types::{Timestamp, DEFAULT_LOOKAHEAD, NO_PRIOR_BOUNDARY};

const LOCK_FILE_NAME: &str = "sync.lock";
const STATE_FILE_NAME: &str = "boundary.json";
const STATE_TMP_NAME: &str = "boundary.json.tmp";

/// Current on-disk document version.
const STATE_FORMAT_VERSION: u32 = 1;

/// Maximum time `initialize` waits for the advisory lock before failing.
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval while waiting for the advisory lock.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Maximum jitter added to each lock poll, in milliseconds.
const POLL_JITTER_MS: u64 = 25;

/// Persisted boundary document. The only shared mutable state.
#[derive(Debug, Serialize, Deserialize)]
struct BoundaryDoc {
    version: u32,
    boundary: Timestamp,
}

/// Tunables for [`FileSynchronizer`].
#[derive(Debug, Clone)]
pub struct FileSyncOptions {
    /// Head-room reserved beyond `now` on every `update`. Larger values
    /// mean fewer durable writes at the cost of more timestamp space
    /// wasted per crash. Clamped to at least 1 so the returned bound is
    /// always strictly greater than `now`.
    pub lookahead: Timestamp,
    /// Bounded wait for the advisory lock in `initialize`.
    pub lock_timeout: Duration,
    /// Poll interval while waiting for the advisory lock.
    pub poll_interval: Duration,
}

impl Default for FileSyncOptions {
    fn default() -> Self {
        FileSyncOptions {
            lookahead: DEFAULT_LOOKAHEAD,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// One process's handle on a file-backed shared store.
///
/// Holds the advisory lock from `initialize` until `deactivate` (or drop;
/// closing the lock file releases the lock, which is also what the OS does
/// on process death).
#[derive(Debug)]
pub struct FileSynchronizer {
    dir: PathBuf,
    options: FileSyncOptions,
    state: HandleState,
    /// Lock file kept open while Active; the open descriptor carries the
    /// flock.
    lock_file: Option<File>,
    /// Last boundary this handle persisted or observed.
    boundary: Timestamp,
}

impl FileSynchronizer {
    /// Creates a handle over the store directory with default options,
    /// creating the directory if needed. No lock is taken until
    /// [`initialize`](TimestampSynchronizer::initialize).
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Io` if the directory cannot be created.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, SyncError> {
        Self::with_options(dir, FileSyncOptions::default())
    }

    /// Creates a handle with explicit options. See [`FileSyncOptions`].
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Io` if the directory cannot be created.
    pub fn with_options(
        dir: impl AsRef<Path>,
        mut options: FileSyncOptions,
    ) -> Result<Self, SyncError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| SyncError::io(format!("creating store directory {}", dir.display()), e))?;
        options.lookahead = options.lookahead.max(1);
        Ok(FileSynchronizer {
            dir,
            options,
            state: HandleState::Uninitialized,
            lock_file: None,
            boundary: NO_PRIOR_BOUNDARY,
        })
    }

    /// Current lifecycle state of this handle.
    pub fn state(&self) -> HandleState {
        self.state
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE_NAME)
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE_NAME)
    }

    /// Acquire the advisory lock, polling with jitter until success or
    /// timeout.
    fn acquire_lock(&self) -> Result<File, SyncError> {
        let lock_path = self.lock_path();
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| SyncError::io(format!("opening lock file {}", lock_path.display()), e))?;

        // Restrict the lock file to the owning user.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = fs::Permissions::from_mode(0o600);
            if let Err(e) = fs::set_permissions(&lock_path, perms) {
                tracing::warn!(path = %lock_path.display(), err = %e, "failed to set lock file permissions");
            }
        }

        let start = Instant::now();
        loop {
            let acquired = try_flock_exclusive(&lock_file)
                .map_err(|e| SyncError::io(format!("locking {}", lock_path.display()), e))?;
            if acquired {
                tracing::debug!(path = %lock_path.display(), "acquired boundary lock");
                return Ok(lock_file);
            }
            let elapsed = start.elapsed();
            if elapsed >= self.options.lock_timeout {
                return Err(SyncError::LockTimeout {
                    path: lock_path,
                    elapsed,
                });
            }
            let jitter_ms = rand::random::<u64>() % (POLL_JITTER_MS + 1);
            // Never sleep past the deadline.
            let remaining = self.options.lock_timeout - elapsed;
            let sleep = (self.options.poll_interval + Duration::from_millis(jitter_ms))
                .min(remaining);
            std::thread::sleep(sleep);
        }
    }

    /// Read the persisted boundary. A missing state file means a fresh
    /// store and maps to [`NO_PRIOR_BOUNDARY`].
    fn read_boundary(&self) -> Result<Timestamp, SyncError> {
        let state_path = self.state_path();
        let bytes = match fs::read(&state_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %state_path.display(), "no prior boundary state, fresh store");
                return Ok(NO_PRIOR_BOUNDARY);
            }
            Err(e) => {
                return Err(SyncError::io(
                    format!("reading boundary state {}", state_path.display()),
                    e,
                ))
            }
        };
        let doc: BoundaryDoc =
            serde_json::from_slice(&bytes).map_err(|e| SyncError::CorruptState {
                path: state_path.clone(),
                reason: e.to_string(),
            })?;
        if doc.version != STATE_FORMAT_VERSION {
            return Err(SyncError::CorruptState {
                path: state_path,
                reason: format!("unsupported state version {}", doc.version),
            });
        }
        Ok(doc.boundary)
    }

    /// Durably persist `boundary` via write-to-temp-then-rename, so a crash
    /// mid-write never truncates or corrupts the state file.
    fn write_boundary(&self, boundary: Timestamp) -> Result<(), SyncError> {
        let tmp_path = self.dir.join(STATE_TMP_NAME);
        let state_path = self.state_path();
        let doc = BoundaryDoc {
            version: STATE_FORMAT_VERSION,
            boundary,
        };
        // BoundaryDoc serialization is infallible; any error here is I/O.
        let bytes = serde_json::to_vec(&doc)
            .map_err(|e| SyncError::io("encoding boundary state", e.into()))?;

        let mut tmp = File::create(&tmp_path)
            .map_err(|e| SyncError::io(format!("creating {}", tmp_path.display()), e))?;
        tmp.write_all(&bytes)
            .map_err(|e| SyncError::io(format!("writing {}", tmp_path.display()), e))?;
        tmp.sync_all()
            .map_err(|e| SyncError::io(format!("flushing {}", tmp_path.display()), e))?;
        drop(tmp);

        // Atomic on POSIX: readers see either the old or the new document.
        fs::rename(&tmp_path, &state_path).map_err(|e| {
            SyncError::io(
                format!(
                    "renaming {} over {}",
                    tmp_path.display(),
                    state_path.display()
                ),
                e,
            )
        })?;

        // The rename only swaps a directory entry in the page cache; the
        // reservation is not crash-durable until the directory inode itself
        // is flushed.
        #[cfg(unix)]
        {
            let dir = File::open(&self.dir)
                .map_err(|e| SyncError::io(format!("opening {}", self.dir.display()), e))?;
            dir.sync_all()
                .map_err(|e| SyncError::io(format!("flushing {}", self.dir.display()), e))?;
        }
        Ok(())
    }
}

impl TimestampSynchronizer for FileSynchronizer {
    fn initialize(&mut self) -> Result<Timestamp, SyncError> {
        if self.state != HandleState::Uninitialized {
            return Err(SyncError::InvalidState {
                operation: "initialize",
                state: self.state,
            });
        }
        // Acquire first; the boundary read below is only meaningful under
        // the lock. If the read fails, dropping `lock_file` releases the
        // lock and the handle stays Uninitialized.
        let lock_file = self.acquire_lock()?;
        let boundary = self.read_boundary()?;

        self.lock_file = Some(lock_file);
        self.boundary = boundary;
        self.state = HandleState::Active;
        tracing::debug!(dir = %self.dir.display(), boundary, "synchronizer initialized");
        Ok(boundary)
    }

    fn update(&mut self, now: Timestamp) -> Result<Timestamp, SyncError> {
        if self.state != HandleState::Active {
            return Err(SyncError::InvalidState {
                operation: "update",
                state: self.state,
            });
        }
        // Never below the current boundary, even for a `now` in the past.
        let next = now.max(self.boundary).saturating_add(self.options.lookahead);
        self.write_boundary(next)?;
        self.boundary = next;
        tracing::info!(dir = %self.dir.display(), now, boundary = next, "advanced timestamp boundary");
        Ok(next)
    }

    fn deactivate(&mut self) -> Result<(), SyncError> {
        if self.state != HandleState::Active {
            return Err(SyncError::InvalidState {
                operation: "deactivate",
                state: self.state,
            });
        }
        self.state = HandleState::Deactivated;
        if let Some(lock_file) = self.lock_file.take() {
            let lock_path = self.lock_path();
            funlock(&lock_file)
                .map_err(|e| SyncError::io(format!("unlocking {}", lock_path.display()), e))?;
            tracing::debug!(path = %lock_path.display(), "released boundary lock");
        }
        Ok(())
    }
}

// ── File lock helpers ───────────────────────────────────────────────────────

/// Try to acquire an exclusive flock on a file (non-blocking).
///
/// Returns `Ok(true)` if the lock was acquired, `Ok(false)` if the file is
/// already locked by another process.
fn try_flock_exclusive(file: &File) -> std::io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: flock is a standard POSIX call. fd is a valid file
        // descriptor owned by `file`. LOCK_EX | LOCK_NB is a non-blocking
        // exclusive lock.
        #[allow(unsafe_code)]
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = std::io::Error::last_os_error();
        if err.kind() == std::io::ErrorKind::WouldBlock
            || err.raw_os_error() == Some(libc::EWOULDBLOCK)
        {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        // No inter-process exclusion off unix; single-process use only.
        let _ = file;
        Ok(true)
    }
}

/// Explicitly release a held flock. Closing the descriptor releases it too;
/// this exists so `deactivate` can surface a release failure.
fn funlock(file: &File) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: see `try_flock_exclusive`. LOCK_UN releases the lock.
        #[allow(unsafe_code)]
        let result = unsafe { libc::flock(fd, libc::LOCK_UN) };
        if result == 0 {
            return Ok(());
        }
        Err(std::io::Error::last_os_error())
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_boundary_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let sync = FileSynchronizer::new(dir.path()).unwrap();
        sync.write_boundary(421_337).unwrap();
        assert_eq!(sync.read_boundary().unwrap(), 421_337);
    }

    #[test]
    fn update_publishes_state_and_removes_temp() {
        let dir = tempfile::tempdir().unwrap();
        let mut sync = FileSynchronizer::new(dir.path()).unwrap();
        sync.initialize().unwrap();
        let bound = sync.update(77).unwrap();

        // The published document is the only state left behind; the
        // temporary never outlives the rename+flush sequence.
        assert!(!dir.path().join(STATE_TMP_NAME).exists());
        assert_eq!(sync.read_boundary().unwrap(), bound);
    }

    #[test]
    fn missing_state_file_reads_as_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let sync = FileSynchronizer::new(dir.path()).unwrap();
        assert_eq!(sync.read_boundary().unwrap(), NO_PRIOR_BOUNDARY);
    }

    #[test]
    fn garbage_state_file_is_corrupt_not_fresh() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(STATE_FILE_NAME), b"not json at all").unwrap();
        let sync = FileSynchronizer::new(dir.path()).unwrap();
        assert!(matches!(
            sync.read_boundary(),
            Err(SyncError::CorruptState { .. })
        ));
    }

    #[test]
    fn future_state_version_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(STATE_FILE_NAME),
            br#"{"version":99,"boundary":5}"#,
        )
        .unwrap();
        let sync = FileSynchronizer::new(dir.path()).unwrap();
        assert!(matches!(
            sync.read_boundary(),
            Err(SyncError::CorruptState { .. })
        ));
    }

    #[test]
    fn zero_lookahead_is_clamped_to_one() {
        let dir = tempfile::tempdir().unwrap();
        let options = FileSyncOptions {
            lookahead: 0,
            ..FileSyncOptions::default()
        };
        let mut sync = FileSynchronizer::with_options(dir.path(), options).unwrap();
        sync.initialize().unwrap();
        let bound = sync.update(100).unwrap();
        assert!(bound > 100);
    }

    #[cfg(unix)]
    #[test]
    fn flock_helpers_exclude_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("l");
        let a = File::create(&path).unwrap();
        let b = File::options().read(true).open(&path).unwrap();

        assert!(try_flock_exclusive(&a).unwrap());
        // Separate open of the same file must be excluded.
        assert!(!try_flock_exclusive(&b).unwrap());
        funlock(&a).unwrap();
        assert!(try_flock_exclusive(&b).unwrap());
    }
}
