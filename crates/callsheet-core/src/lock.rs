use crate::error::{ErrorCode, LedgerError};
use fs2::FileExt;
use std::{
    collections::{BTreeSet, HashSet},
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::{Condvar, Mutex, PoisonError},
    thread,
    time::{Duration, Instant},
};

/// Advisory lock errors for the ledger directory and the in-process owner
/// arena.
#[derive(Debug)]
pub enum LockError {
    Timeout { path: PathBuf, waited: Duration },
    OwnersBusy { owners: Vec<String>, waited: Duration },
    IoError(io::Error),
}

impl From<io::Error> for LockError {
    fn from(err: io::Error) -> Self {
        Self::IoError(err)
    }
}

impl LockError {
    /// Machine-readable code associated with this lock error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Timeout { .. } | Self::OwnersBusy { .. } => ErrorCode::LockContention,
            Self::IoError(_) => ErrorCode::StoreUnavailable,
        }
    }
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout { path, waited } => {
                write!(
                    f,
                    "{}: lock timed out after {:?} at {}",
                    self.code().code(),
                    waited,
                    path.display()
                )
            }
            Self::OwnersBusy { owners, waited } => {
                write!(
                    f,
                    "{}: owner lock timed out after {:?} for {}",
                    self.code().code(),
                    waited,
                    owners.join(", ")
                )
            }
            Self::IoError(err) => write!(f, "{}: {}", self.code().code(), err),
        }
    }
}

impl std::error::Error for LockError {}

impl From<LockError> for LedgerError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Timeout { path, waited } => Self::LockContention {
                resource: format!("lock file {}", path.display()),
                waited_ms: waited.as_millis(),
            },
            LockError::OwnersBusy { owners, waited } => Self::LockContention {
                resource: format!("callers {}", owners.join(", ")),
                waited_ms: waited.as_millis(),
            },
            LockError::IoError(source) => Self::store("acquire ledger lock", source),
        }
    }
}

// ---------------------------------------------------------------------------
// Process-level file locks
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum LockKind {
    Shared,
    Exclusive,
}

#[derive(Debug)]
struct FileGuard {
    file: File,
}

impl FileGuard {
    fn acquire(path: &Path, timeout: Duration, kind: LockKind) -> Result<Self, LockError> {
        let parent = path.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "lock path has no parent")
        })?;
        fs::create_dir_all(parent)?;

        let start = Instant::now();
        loop {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(path)?;

            let contended = match kind {
                LockKind::Shared => file.try_lock_shared().is_err(),
                LockKind::Exclusive => file.try_lock_exclusive().is_err(),
            };

            if !contended {
                return Ok(Self { file });
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout {
                    path: path.to_path_buf(),
                    waited: start.elapsed(),
                });
            }

            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl Drop for FileGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// RAII guard held by a mutating command for its whole run.
#[derive(Debug)]
pub struct LedgerWriteLock {
    guard: FileGuard,
}

impl LedgerWriteLock {
    /// Acquire an exclusive advisory lock on the lock path.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        Ok(Self {
            guard: FileGuard::acquire(path, timeout, LockKind::Exclusive)?,
        })
    }
}

/// RAII guard held by read-only commands; compatible with other readers.
#[derive(Debug)]
pub struct LedgerReadLock {
    guard: FileGuard,
}

impl LedgerReadLock {
    /// Acquire a shared advisory lock on the lock path.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, LockError> {
        Ok(Self {
            guard: FileGuard::acquire(path, timeout, LockKind::Shared)?,
        })
    }
}

// ---------------------------------------------------------------------------
// In-process owner arena
// ---------------------------------------------------------------------------

/// One logical lock per owner key.
///
/// A caller names every owner it will touch up front and gets all of them or
/// none, so two reallocations over the same pair of users in opposite
/// directions cannot deadlock.
#[derive(Debug, Default)]
pub struct OwnerLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

impl OwnerLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until none of `owners` is held, then hold them all.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::OwnersBusy`] when `timeout` elapses first.
    pub fn acquire(&self, owners: &[&str], timeout: Duration) -> Result<OwnerGuard<'_>, LockError> {
        let wanted: BTreeSet<String> = owners.iter().map(|owner| (*owner).to_string()).collect();
        let start = Instant::now();

        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while wanted.iter().any(|owner| held.contains(owner)) {
            let Some(remaining) = timeout.checked_sub(start.elapsed()) else {
                return Err(LockError::OwnersBusy {
                    owners: wanted.iter().cloned().collect(),
                    waited: start.elapsed(),
                });
            };
            held = self
                .released
                .wait_timeout(held, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        held.extend(wanted.iter().cloned());
        drop(held);

        Ok(OwnerGuard {
            locks: self,
            owners: wanted,
        })
    }
}

/// Releases its owners on drop.
#[derive(Debug)]
pub struct OwnerGuard<'a> {
    locks: &'a OwnerLocks,
    owners: BTreeSet<String>,
}

impl OwnerGuard<'_> {
    #[must_use]
    pub const fn owners(&self) -> &BTreeSet<String> {
        &self.owners
    }
}

impl Drop for OwnerGuard<'_> {
    fn drop(&mut self) {
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for owner in &self.owners {
            held.remove(owner);
        }
        drop(held);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::{LedgerReadLock, LedgerWriteLock, LockError, OwnerLocks};
    use crate::error::{ErrorCode, LedgerError};
    use std::{
        path::PathBuf,
        sync::{Arc, Barrier},
        thread,
        time::Duration,
    };

    fn lock_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push("callsheet_lock_tests");
        path.push(name);
        path
    }

    #[test]
    fn write_lock_is_released_on_drop() -> Result<(), LockError> {
        let path = lock_path("basic.lock");
        let lock = LedgerWriteLock::acquire(&path, Duration::from_millis(50))?;
        assert!(path.is_file());
        drop(lock);
        let _again = LedgerWriteLock::acquire(&path, Duration::from_millis(50))?;
        Ok(())
    }

    #[test]
    fn write_lock_times_out_when_held() {
        let path = lock_path("timeout.lock");
        let _guard = LedgerWriteLock::acquire(&path, Duration::from_millis(50)).unwrap();
        let err = LedgerWriteLock::acquire(&path, Duration::from_millis(20)).unwrap_err();

        assert!(matches!(err, LockError::Timeout { path: p, .. } if p == path));
    }

    #[test]
    fn lock_timeout_maps_to_lock_contention() {
        let timeout = LockError::Timeout {
            path: lock_path("code.lock"),
            waited: Duration::from_millis(10),
        };
        assert_eq!(timeout.code(), ErrorCode::LockContention);

        let ledger_err: LedgerError = timeout.into();
        assert_eq!(ledger_err.code(), ErrorCode::LockContention);
        assert!(ledger_err.to_string().contains("code.lock"));
    }

    #[test]
    fn owner_timeout_names_the_owners() {
        let locks = OwnerLocks::new();
        let _held = locks.acquire(&["ben"], Duration::from_millis(50)).unwrap();

        let err = locks
            .acquire(&["ben", "ana"], Duration::from_millis(20))
            .unwrap_err();
        let LockError::OwnersBusy { owners, waited } = &err else {
            panic!("expected OwnersBusy, got {err:?}");
        };
        assert_eq!(owners, &["ana", "ben"]);
        assert!(*waited >= Duration::from_millis(20));
        assert!(err.to_string().contains("ana, ben"));

        let ledger_err: LedgerError = err.into();
        assert_eq!(ledger_err.code(), ErrorCode::LockContention);
        let message = ledger_err.to_string();
        assert!(message.contains("callers ana, ben"), "{message}");
        assert!(!message.contains("owners:"), "{message}");
        assert!(!message.contains("lock file"), "{message}");
    }

    #[test]
    fn read_locks_are_compatible() -> Result<(), LockError> {
        let path = lock_path("read-share.lock");
        let _first = LedgerReadLock::acquire(&path, Duration::from_millis(50))?;
        let _second = LedgerReadLock::acquire(&path, Duration::from_millis(50))?;
        Ok(())
    }

    #[test]
    fn write_blocks_readers() {
        let path = lock_path("write-blocks-read.lock");
        let _write = LedgerWriteLock::acquire(&path, Duration::from_millis(50)).unwrap();

        let started = std::time::Instant::now();
        let read = LedgerReadLock::acquire(&path, Duration::from_millis(20));

        assert!(matches!(read, Err(LockError::Timeout { .. })));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn owner_locks_are_independent_per_owner() {
        let locks = OwnerLocks::new();
        let ana = locks.acquire(&["ana"], Duration::from_millis(50)).unwrap();
        let ben = locks.acquire(&["ben"], Duration::from_millis(50)).unwrap();

        let err = locks
            .acquire(&["ben", "ana"], Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, LockError::OwnersBusy { .. }));

        drop(ana);
        assert!(locks.acquire(&["ana"], Duration::from_millis(20)).is_ok());
        assert!(locks.acquire(&["ben"], Duration::from_millis(20)).is_err());
        drop(ben);
        let both = locks.acquire(&["ben", "ana"], Duration::from_millis(50)).unwrap();
        assert_eq!(both.owners().len(), 2);
    }

    #[test]
    fn owner_lock_waiter_proceeds_after_release() {
        let locks = Arc::new(OwnerLocks::new());
        let held = Arc::new(Barrier::new(2));

        let locks_in_thread = Arc::clone(&locks);
        let held_in_thread = Arc::clone(&held);
        let handle = thread::spawn(move || {
            let _guard = locks_in_thread
                .acquire(&["ana"], Duration::from_millis(200))
                .unwrap();
            held_in_thread.wait();
            thread::sleep(Duration::from_millis(30));
        });

        held.wait();
        let guard = locks.acquire(&["ana"], Duration::from_secs(2)).unwrap();
        assert!(guard.owners().contains("ana"));
        drop(guard);
        handle.join().unwrap();
    }

    #[test]
    fn duplicate_owner_names_collapse() {
        let locks = OwnerLocks::new();
        let guard = locks.acquire(&["ana", "ana"], Duration::from_millis(50)).unwrap();
        assert_eq!(guard.owners().len(), 1);
    }
}
