//! In-memory store with an observable probe.
//!
//! `MemoryStore` behaves like a [`FileStore`](crate::FileStore) without
//! touching the disk: it simulates the exclusive lock with a flag, counts how
//! often the lock is given up, and records every thread that calls into it.
//! The [`StoreProbe`] is `Send + Sync` so tests can watch a store that lives
//! on another thread.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use crate::error::{StoreError, StoreResult};
use crate::store::{CacheStore, NamedCache};

/// Counters shared between a [`MemoryStore`] and its observers.
#[derive(Debug, Default)]
pub struct StoreProbe {
    lock_acquisitions: AtomicU64,
    long_operations: AtomicU64,
    unlocked_accesses: AtomicU64,
    caches_created: AtomicU64,
    closed: AtomicBool,
    lock_held: AtomicBool,
    threads: Mutex<HashSet<ThreadId>>,
    fail_on_key: Mutex<Option<String>>,
}

impl StoreProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of times the exclusive lock was (re)acquired.
    pub fn lock_acquisitions(&self) -> u64 {
        self.lock_acquisitions.load(Ordering::SeqCst)
    }

    /// Number of long running operations, i.e. voluntary lock releases.
    pub fn long_operations(&self) -> u64 {
        self.long_operations.load(Ordering::SeqCst)
    }

    /// Cache operations attempted while the lock was released.
    pub fn unlocked_accesses(&self) -> u64 {
        self.unlocked_accesses.load(Ordering::SeqCst)
    }

    pub fn caches_created(&self) -> u64 {
        self.caches_created.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_lock_held(&self) -> bool {
        self.lock_held.load(Ordering::SeqCst)
    }

    /// Distinct threads that called into the store.
    pub fn threads(&self) -> HashSet<ThreadId> {
        self.threads.lock().map(|t| t.clone()).unwrap_or_default()
    }

    /// Make every later operation on `key` fail with a backend error.
    pub fn fail_on_key(&self, key: impl Into<String>) {
        if let Ok(mut fail) = self.fail_on_key.lock() {
            *fail = Some(key.into());
        }
    }

    fn touch(&self) {
        if let Ok(mut threads) = self.threads.lock() {
            threads.insert(thread::current().id());
        }
    }

    fn set_lock_held(&self, held: bool) {
        if held {
            self.lock_acquisitions.fetch_add(1, Ordering::SeqCst);
        }
        self.lock_held.store(held, Ordering::SeqCst);
    }

    fn check_failure(&self, key: &str) -> StoreResult<()> {
        let failing = self
            .fail_on_key
            .lock()
            .map(|fail| fail.as_deref() == Some(key))
            .unwrap_or(false);
        if failing {
            Err(StoreError::Backend(format!("injected failure for key {}", key)))
        } else {
            Ok(())
        }
    }
}

type Entries = Rc<RefCell<BTreeMap<String, Vec<u8>>>>;

/// Named cache inside a [`MemoryStore`].
pub struct MemoryCache {
    entries: Entries,
    locked: Rc<Cell<bool>>,
    probe: Arc<StoreProbe>,
}

impl MemoryCache {
    fn begin(&self, key: &str) -> StoreResult<()> {
        self.probe.touch();
        if !self.locked.get() {
            self.probe.unlocked_accesses.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::LockNotHeld);
        }
        self.probe.check_failure(key)
    }
}

impl NamedCache for MemoryCache {
    fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.begin(key)?;
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> StoreResult<()> {
        self.begin(key)?;
        self.entries.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> StoreResult<()> {
        self.begin(key)?;
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// Store that keeps every named cache in memory.
pub struct MemoryStore {
    base_dir: PathBuf,
    locked: Rc<Cell<bool>>,
    caches: HashMap<PathBuf, Entries>,
    probe: Arc<StoreProbe>,
}

impl MemoryStore {
    /// Open a store reporting to `probe`. The lock is held on return.
    pub fn open(probe: Arc<StoreProbe>) -> Self {
        probe.touch();
        probe.set_lock_held(true);
        Self {
            base_dir: PathBuf::from("memory"),
            locked: Rc::new(Cell::new(true)),
            caches: HashMap::new(),
            probe,
        }
    }

    fn set_locked(&self, held: bool) {
        self.locked.set(held);
        self.probe.set_lock_held(held);
    }
}

impl CacheStore for MemoryStore {
    type Cache = MemoryCache;

    fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn use_under_exclusive_lock<T>(
        &mut self,
        _description: &str,
        work: impl FnOnce(&mut Self) -> T,
    ) -> StoreResult<T> {
        self.probe.touch();
        if !self.locked.get() {
            self.set_locked(true);
        }
        Ok(work(&mut *self))
    }

    fn run_long_operation<T>(
        &mut self,
        _description: &str,
        work: impl FnOnce() -> T,
    ) -> StoreResult<T> {
        self.probe.touch();
        self.probe.long_operations.fetch_add(1, Ordering::SeqCst);
        self.set_locked(false);
        let out = work();
        self.set_locked(true);
        Ok(out)
    }

    fn create_named_cache(&mut self, file: &Path) -> StoreResult<MemoryCache> {
        self.probe.touch();
        self.probe.caches_created.fetch_add(1, Ordering::SeqCst);
        let entries = self.caches.entry(file.to_path_buf()).or_default();
        Ok(MemoryCache {
            entries: Rc::clone(entries),
            locked: Rc::clone(&self.locked),
            probe: Arc::clone(&self.probe),
        })
    }

    fn close(self) -> StoreResult<()> {
        self.probe.touch();
        self.set_locked(false);
        self.probe.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
