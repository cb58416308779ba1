//! The store collaborator interface.
//!
//! A [`CacheStore`] is opened once, used from exactly one thread, and closed
//! once. It owns a process-level exclusive lock that it holds by default.
//! Callers that are about to sit idle wrap the idle period in
//! [`CacheStore::run_long_operation`] so the lock can be handed to other
//! processes in the meantime.
//!
//! Implementations are not expected to be `Send`: the thread that opened the
//! store is the only one allowed to use it.

use std::path::Path;

use crate::error::StoreResult;

/// One logical key/value collection inside a store.
pub trait NamedCache {
    /// Look up a key. `None` is the absent representation.
    fn get(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    fn put(&mut self, key: &str, value: Vec<u8>) -> StoreResult<()>;

    fn remove(&mut self, key: &str) -> StoreResult<()>;
}

/// An opened, lock-protected store.
pub trait CacheStore {
    type Cache: NamedCache;

    /// Directory holding the store's files.
    fn base_dir(&self) -> &Path;

    /// Run `work` with the exclusive lock guaranteed to be held.
    fn use_under_exclusive_lock<T>(
        &mut self,
        description: &str,
        work: impl FnOnce(&mut Self) -> T,
    ) -> StoreResult<T>;

    /// Run `work` during which the exclusive lock may be released.
    ///
    /// The lock is held again when this returns `Ok`.
    fn run_long_operation<T>(&mut self, description: &str, work: impl FnOnce() -> T)
        -> StoreResult<T>;

    /// Open (creating if needed) the named cache stored in `file`.
    fn create_named_cache(&mut self, file: &Path) -> StoreResult<Self::Cache>;

    /// Flush and close the store, releasing the exclusive lock.
    fn close(self) -> StoreResult<()>;
}
