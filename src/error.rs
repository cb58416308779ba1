//! Caller-facing errors.

use history_store::{CodecError, StoreError};
use thiserror::Error;

use crate::config::ConfigError;

/// Cache result type
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors returned by the actor controller and cache handles.
///
/// `NotStarted` and `StopRequested` are the conditions callers are expected
/// to branch on. Everything else aborts the operation that hit it.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache access actor has not been started yet")]
    NotStarted,

    #[error("cache access actor was already started")]
    AlreadyStarted,

    #[error("stop requested while accessing the cache")]
    StopRequested,

    #[error("cache access actor terminated after a store failure")]
    ActorFailed,

    #[error("cache access actor panicked")]
    ActorPanicked,

    #[error("cache {name} already declared as {existing}, requested {requested}")]
    IdentityConflict {
        name: String,
        existing: String,
        requested: String,
    },

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to spawn actor thread: {0}")]
    Spawn(std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CacheError {
    pub fn is_not_started(&self) -> bool {
        matches!(self, Self::NotStarted)
    }

    pub fn is_stop_requested(&self) -> bool {
        matches!(self, Self::StopRequested)
    }
}
