//! Process-level exclusive lock on a store directory.
//!
//! Every process that opens the same store directory competes for one
//! advisory lock file. The lock is exclusive: while one process holds it,
//! others block (polling) in [`ProcessLock::acquire`] until it is released
//! or their timeout expires.
//!
//! Contention is reported once through `tracing` so that a stalled process
//! can be diagnosed. The lock is released when the [`ProcessLock`] is dropped.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;

/// Lock result type
pub type LockResult<T> = Result<T, LockError>;

/// Errors from lock operations
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock timeout after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Exclusive advisory lock shared with other processes.
pub struct ProcessLock {
    lock_path: PathBuf,
    #[allow(dead_code)]
    lock_file: File,
    acquired_at: Instant,
}

impl ProcessLock {
    /// Lock file name
    pub const LOCK_FILENAME: &'static str = ".history-cache.lock";

    const POLL_INTERVAL: Duration = Duration::from_millis(50);
    const CONTENTION_WARNING_AFTER: Duration = Duration::from_millis(500);

    /// Acquire the lock for `dir`, waiting up to `timeout`.
    ///
    /// Creates the directory and lock file if they don't exist.
    pub fn acquire(dir: &Path, timeout: Duration) -> LockResult<Self> {
        fs::create_dir_all(dir)?;

        let lock_path = dir.join(Self::LOCK_FILENAME);
        let start = Instant::now();
        let mut warned = false;

        loop {
            match Self::try_acquire_exclusive(&lock_path) {
                Ok(file) => {
                    if warned {
                        tracing::info!(
                            path = %lock_path.display(),
                            waited_ms = start.elapsed().as_millis() as u64,
                            "store lock acquired after contention"
                        );
                    }
                    return Ok(Self {
                        lock_path,
                        lock_file: file,
                        acquired_at: Instant::now(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if !warned && start.elapsed() > Self::CONTENTION_WARNING_AFTER {
                        tracing::warn!(
                            path = %lock_path.display(),
                            "store lock held by another process, waiting"
                        );
                        warned = true;
                    }
                }
                Err(e) => return Err(LockError::Io(e)),
            }

            if start.elapsed() >= timeout {
                return Err(LockError::Timeout(timeout));
            }

            std::thread::sleep(Self::POLL_INTERVAL.min(timeout));
        }
    }

    #[cfg(unix)]
    fn try_acquire_exclusive(lock_path: &Path) -> io::Result<File> {
        use std::os::unix::fs::OpenOptionsExt;
        use std::os::unix::io::AsRawFd;

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o644)
            .open(lock_path)?;

        let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };

        if result == 0 {
            Ok(file)
        } else {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "lock held"))
            } else {
                Err(err)
            }
        }
    }

    #[cfg(not(unix))]
    fn try_acquire_exclusive(lock_path: &Path) -> io::Result<File> {
        match OpenOptions::new().write(true).create_new(true).open(lock_path) {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "lock held"))
            }
            Err(e) => Err(e),
        }
    }

    /// Get the lock file path.
    pub fn path(&self) -> &Path {
        &self.lock_path
    }

    /// How long this lock has been held.
    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl std::fmt::Debug for ProcessLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessLock")
            .field("lock_path", &self.lock_path)
            .field("held_for", &self.held_for())
            .finish()
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.lock_file.as_raw_fd(), libc::LOCK_UN);
            }
        }

        // The fallback lock is the file's existence.
        #[cfg(not(unix))]
        {
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_creates_lock_file() {
        let temp_dir = TempDir::new().unwrap();
        let store_dir = temp_dir.path().join("store");

        let lock = ProcessLock::acquire(&store_dir, Duration::from_secs(1)).unwrap();

        assert!(lock.path().exists());
        assert_eq!(lock.path().file_name().unwrap(), ProcessLock::LOCK_FILENAME);
    }

    #[test]
    fn test_acquire_creates_nested_directory() {
        let temp_dir = TempDir::new().unwrap();
        let store_dir = temp_dir.path().join("nested").join("store");
        assert!(!store_dir.exists());

        let _lock = ProcessLock::acquire(&store_dir, Duration::from_secs(1)).unwrap();

        assert!(store_dir.exists());
    }

    #[test]
    fn test_released_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let store_dir = temp_dir.path().join("store");

        {
            let _lock = ProcessLock::acquire(&store_dir, Duration::from_secs(1)).unwrap();
        }

        let _again = ProcessLock::acquire(&store_dir, Duration::from_millis(200)).unwrap();
    }

    #[test]
    fn test_second_holder_times_out() {
        use std::sync::mpsc;
        use std::thread;

        let temp_dir = TempDir::new().unwrap();
        let store_dir = temp_dir.path().join("store");
        let store_dir2 = store_dir.clone();

        let held = ProcessLock::acquire(&store_dir, Duration::from_secs(1)).unwrap();

        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let result = ProcessLock::acquire(&store_dir2, Duration::from_millis(100));
            tx.send(matches!(result, Err(LockError::Timeout(_)))).unwrap();
        });

        assert!(rx.recv().unwrap(), "second acquisition should time out");
        handle.join().unwrap();
        drop(held);
    }

    #[test]
    fn test_waiter_gets_lock_after_release() {
        use std::thread;

        let temp_dir = TempDir::new().unwrap();
        let store_dir = temp_dir.path().join("store");
        let store_dir2 = store_dir.clone();

        let held = ProcessLock::acquire(&store_dir, Duration::from_secs(1)).unwrap();
        let waiter = thread::spawn(move || {
            ProcessLock::acquire(&store_dir2, Duration::from_secs(5)).is_ok()
        });

        thread::sleep(Duration::from_millis(150));
        drop(held);

        assert!(waiter.join().unwrap());
    }
}
