//! History Store
//!
//! The persistent side of the history cache: an on-disk key/value store made
//! of named caches, protected by an exclusive lock shared with other
//! processes.
//!
//! A store is opened, used and closed on a single thread. Nothing here is
//! `Send`; the history cache's access actor is what makes the store usable
//! from many threads.

pub mod codec;
pub mod error;
pub mod file_store;
pub mod lock;
pub mod memory;
pub mod store;

pub use codec::{encode_key, JsonSerializer, StringSerializer, ValueSerializer};
pub use error::{CodecError, StoreError, StoreResult};
pub use file_store::{FileCache, FileStore, CACHE_FILE_VERSION};
pub use lock::{LockError, LockResult, ProcessLock};
pub use memory::{MemoryCache, MemoryStore, StoreProbe};
pub use store::{CacheStore, NamedCache};
