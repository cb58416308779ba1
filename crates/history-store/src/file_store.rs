//! File-backed store.
//!
//! Layout: `<base_dir>/.history-cache.lock` plus one `<name>.bin` file per
//! named cache. Each cache file is a small JSON document:
//!
//! ```json
//! { "version": 1, "entries": { "\"compileJava\"": "<base64 value>" } }
//! ```
//!
//! Cache contents are loaded on first access and kept in memory while the
//! process lock is held. Dirty caches are written back (temp file + rename)
//! before the lock is given up, and are reloaded after it is re-acquired so
//! that writes made by other processes in between become visible.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::lock::ProcessLock;
use crate::store::{CacheStore, NamedCache};

/// Current cache file format version
pub const CACHE_FILE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CacheFileContents {
    version: u32,
    entries: BTreeMap<String, String>,
}

#[derive(Debug)]
struct CacheFile {
    path: PathBuf,
    /// `None` until loaded, and again after the lock was released.
    entries: Option<BTreeMap<String, Vec<u8>>>,
    dirty: bool,
}

impl CacheFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            entries: None,
            dirty: false,
        }
    }

    fn entries(&mut self) -> StoreResult<&mut BTreeMap<String, Vec<u8>>> {
        if self.entries.is_none() {
            self.entries = Some(Self::load(&self.path)?);
        }
        match self.entries.as_mut() {
            Some(entries) => Ok(entries),
            None => Err(StoreError::Backend("cache file not loaded".to_string())),
        }
    }

    fn load(path: &Path) -> StoreResult<BTreeMap<String, Vec<u8>>> {
        if !path.exists() {
            return Ok(BTreeMap::new());
        }

        let bytes = fs::read(path)?;
        let contents: CacheFileContents =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if contents.version != CACHE_FILE_VERSION {
            return Err(StoreError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("unsupported version {}", contents.version),
            });
        }

        contents
            .entries
            .into_iter()
            .map(|(key, encoded)| {
                BASE64
                    .decode(encoded.as_bytes())
                    .map(|value| (key, value))
                    .map_err(|e| StoreError::Corrupt {
                        path: path.to_path_buf(),
                        reason: e.to_string(),
                    })
            })
            .collect()
    }

    fn flush(&mut self) -> StoreResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let Some(entries) = self.entries.as_ref() else {
            return Ok(());
        };

        let contents = CacheFileContents {
            version: CACHE_FILE_VERSION,
            entries: entries
                .iter()
                .map(|(key, value)| (key.clone(), BASE64.encode(value)))
                .collect(),
        };
        let json = serde_json::to_vec(&contents)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "cache".to_string());
        let temp_path = self
            .path
            .with_file_name(format!(".{}.tmp.{}", file_name, std::process::id()));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let write = || -> std::io::Result<()> {
            let mut file = File::create(&temp_path)?;
            file.write_all(&json)?;
            file.sync_all()?;
            fs::rename(&temp_path, &self.path)
        };
        if let Err(e) = write() {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::Io(e));
        }

        self.dirty = false;
        Ok(())
    }
}

/// A named cache inside a [`FileStore`].
pub struct FileCache {
    file: Rc<RefCell<CacheFile>>,
    lock_held: Rc<Cell<bool>>,
}

impl FileCache {
    fn check_lock(&self) -> StoreResult<()> {
        if self.lock_held.get() {
            Ok(())
        } else {
            Err(StoreError::LockNotHeld)
        }
    }
}

impl NamedCache for FileCache {
    fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.check_lock()?;
        let mut file = self.file.borrow_mut();
        Ok(file.entries()?.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.check_lock()?;
        let mut file = self.file.borrow_mut();
        file.entries()?.insert(key.to_string(), value);
        file.dirty = true;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StoreResult<()> {
        self.check_lock()?;
        let mut file = self.file.borrow_mut();
        if file.entries()?.remove(key).is_some() {
            file.dirty = true;
        }
        Ok(())
    }
}

/// On-disk store guarded by a [`ProcessLock`].
pub struct FileStore {
    base_dir: PathBuf,
    lock_timeout: Duration,
    lock: Option<ProcessLock>,
    lock_held: Rc<Cell<bool>>,
    caches: Vec<Rc<RefCell<CacheFile>>>,
}

impl FileStore {
    /// Open the store in `base_dir`, acquiring its process lock.
    pub fn open(base_dir: impl AsRef<Path>, lock_timeout: Duration) -> StoreResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;

        let mut store = Self {
            base_dir,
            lock_timeout,
            lock: None,
            lock_held: Rc::new(Cell::new(false)),
            caches: Vec::new(),
        };
        store.ensure_locked()?;

        tracing::debug!(dir = %store.base_dir.display(), "file store opened");
        Ok(store)
    }

    /// Whether the process lock is currently held.
    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    fn ensure_locked(&mut self) -> StoreResult<()> {
        if self.lock.is_none() {
            self.lock = Some(ProcessLock::acquire(&self.base_dir, self.lock_timeout)?);
            self.lock_held.set(true);
        }
        Ok(())
    }

    fn release_lock(&mut self) {
        self.lock_held.set(false);
        if let Some(lock) = self.lock.take() {
            tracing::debug!(held_ms = lock.held_for().as_millis() as u64, "store lock released");
        }
    }

    fn flush_all(&mut self) -> StoreResult<()> {
        for cache in &self.caches {
            cache.borrow_mut().flush()?;
        }
        Ok(())
    }
}

impl CacheStore for FileStore {
    type Cache = FileCache;

    fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn use_under_exclusive_lock<T>(
        &mut self,
        description: &str,
        work: impl FnOnce(&mut Self) -> T,
    ) -> StoreResult<T> {
        self.ensure_locked()?;
        tracing::debug!(description, "using store under exclusive lock");
        let out = work(&mut *self);
        if self.lock.is_some() {
            self.flush_all()?;
        }
        Ok(out)
    }

    fn run_long_operation<T>(
        &mut self,
        description: &str,
        work: impl FnOnce() -> T,
    ) -> StoreResult<T> {
        self.flush_all()?;
        for cache in &self.caches {
            cache.borrow_mut().entries = None;
        }
        self.release_lock();
        tracing::debug!(description, "long running operation started");

        let out = work();

        self.ensure_locked()?;
        tracing::debug!(description, "store lock reacquired");
        Ok(out)
    }

    fn create_named_cache(&mut self, file: &Path) -> StoreResult<FileCache> {
        let existing = self
            .caches
            .iter()
            .find(|cache| cache.borrow().path == file)
            .cloned();

        let file = match existing {
            Some(file) => file,
            None => {
                let file = Rc::new(RefCell::new(CacheFile::new(file.to_path_buf())));
                self.caches.push(Rc::clone(&file));
                file
            }
        };

        Ok(FileCache {
            file,
            lock_held: Rc::clone(&self.lock_held),
        })
    }

    fn close(mut self) -> StoreResult<()> {
        if self.lock.is_some() {
            self.flush_all()?;
        }
        self.release_lock();
        tracing::debug!(dir = %self.base_dir.display(), "file store closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn open(dir: &TempDir) -> FileStore {
        FileStore::open(dir.path().join("store"), TIMEOUT).unwrap()
    }

    #[test]
    fn test_open_holds_lock() {
        let temp_dir = TempDir::new().unwrap();
        let store = open(&temp_dir);

        assert!(store.is_locked());
        assert!(store.base_dir().join(ProcessLock::LOCK_FILENAME).exists());
    }

    #[test]
    fn test_values_survive_close_and_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut store = open(&temp_dir);
            let file = store.base_dir().join("tasks.bin");
            let mut cache = store.create_named_cache(&file).unwrap();
            cache.put("\"compileJava\"", b"up-to-date".to_vec()).unwrap();
            cache.put("\"test\"", b"stale".to_vec()).unwrap();
            cache.remove("\"test\"").unwrap();
            store.close().unwrap();
        }

        let mut store = open(&temp_dir);
        let file = store.base_dir().join("tasks.bin");
        let mut cache = store.create_named_cache(&file).unwrap();
        assert_eq!(
            cache.get("\"compileJava\"").unwrap(),
            Some(b"up-to-date".to_vec())
        );
        assert_eq!(cache.get("\"test\"").unwrap(), None);
    }

    #[test]
    fn test_same_file_shares_entries() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let file = store.base_dir().join("tasks.bin");

        let mut first = store.create_named_cache(&file).unwrap();
        let mut second = store.create_named_cache(&file).unwrap();
        first.put("k", vec![1]).unwrap();

        assert_eq!(second.get("k").unwrap(), Some(vec![1]));
    }

    #[test]
    fn test_access_during_long_operation_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let file = store.base_dir().join("tasks.bin");
        let mut cache = store.create_named_cache(&file).unwrap();

        let inside = store
            .run_long_operation("idle", || cache.get("k"))
            .unwrap();

        assert!(matches!(inside, Err(StoreError::LockNotHeld)));
        assert!(store.is_locked());
        assert_eq!(cache.get("k").unwrap(), None);
    }

    #[test]
    fn test_long_operation_lets_another_store_in() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let file = store.base_dir().join("tasks.bin");
        let mut cache = store.create_named_cache(&file).unwrap();
        cache.put("owner", b"first".to_vec()).unwrap();

        let base_dir = store.base_dir().to_path_buf();
        store
            .run_long_operation("idle", || {
                // Flushed before release, so the other store sees it.
                let mut other = FileStore::open(&base_dir, TIMEOUT).unwrap();
                let mut other_cache = other.create_named_cache(&file).unwrap();
                assert_eq!(other_cache.get("owner").unwrap(), Some(b"first".to_vec()));
                other_cache.put("owner", b"second".to_vec()).unwrap();
                other.close().unwrap();
            })
            .unwrap();

        assert_eq!(cache.get("owner").unwrap(), Some(b"second".to_vec()));
    }

    #[test]
    fn test_unsupported_version_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let file = store.base_dir().join("tasks.bin");
        fs::write(&file, r#"{"version": 99, "entries": {}}"#).unwrap();

        let mut cache = store.create_named_cache(&file).unwrap();
        let err = cache.get("k").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_flush_happens_at_end_of_locked_use() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = open(&temp_dir);
        let file = store.base_dir().join("tasks.bin");

        store
            .use_under_exclusive_lock("write", |store| {
                let mut cache = store.create_named_cache(&file).unwrap();
                cache.put("k", b"v".to_vec()).unwrap();
            })
            .unwrap();

        let raw = fs::read_to_string(&file).unwrap();
        assert!(raw.contains("\"version\":1"));
        assert!(raw.contains(&BASE64.encode(b"v")));
    }
}
