//! Error types for store operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::lock::LockError;

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by a [`CacheStore`](crate::CacheStore) or one of its named caches.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// An operation was attempted while the process lock was released.
    #[error("store accessed without holding the exclusive lock")]
    LockNotHeld,

    #[error("corrupt cache file {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    /// Failure reported by the backing implementation itself.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors from converting keys and values to and from their stored bytes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("failed to encode {what}: {reason}")]
    Encode { what: &'static str, reason: String },

    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },
}
