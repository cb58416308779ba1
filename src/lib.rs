//! History Cache
//!
//! Serialized, multi-threaded access to a task history store that may only be
//! used from the thread that opened it and that shares an exclusive lock with
//! other processes.
//!
//! A [`CacheActor`] owns one dedicated thread. That thread opens the store,
//! holds its lock while there is work, and hands the lock to other processes
//! once it has been idle for the configured unlock interval. Callers talk to
//! it through typed [`CacheHandle`]s:
//!
//! ```no_run
//! use history_cache::{ActorConfig, CacheActor};
//! use history_cache::history_store::FileStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ActorConfig::default();
//! let timeout = config.lock_timeout;
//! let actor = CacheActor::new(move || FileStore::open(".history", timeout), config);
//! let tasks = actor.create_cache::<str, String>("taskHistory")?;
//!
//! actor.start()?;
//! tasks.put(":app:compileJava", &"up-to-date".to_string())?;
//! assert_eq!(tasks.get(":app:compileJava")?.as_deref(), Some("up-to-date"));
//! println!("{}", actor.stop()?);
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod config;
pub mod controller;
pub mod error;
pub mod handle;
pub mod lazy;
pub mod logging;

pub use history_store;

pub use actor::{format_duration, ActorSummary, LockState, RequestToken, StoreFactory, StoreInfo, UnlockPolicy};
pub use config::{ActorConfig, ConfigError, EffectiveConfig};
pub use controller::CacheActor;
pub use error::{CacheError, CacheResult};
pub use handle::CacheHandle;
pub use lazy::NamedCacheSpec;
