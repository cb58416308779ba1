//! Messages sent from cache handles to the actor.

use std::fmt;
use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::lazy::NamedCacheSpec;

/// Identity of one logical read.
///
/// Two reads of the same key get different tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestToken(String);

impl RequestToken {
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A read waiting for the actor. The answer goes back over `reply`.
pub(crate) struct PendingRead {
    pub token: RequestToken,
    pub cache: Arc<NamedCacheSpec>,
    pub key: String,
    pub reply: Sender<Option<Vec<u8>>>,
}

pub(crate) enum WriteOp {
    Put(Vec<u8>),
    Remove,
}

/// A put or remove, applied in arrival order.
pub(crate) struct PendingWrite {
    pub cache: Arc<NamedCacheSpec>,
    pub key: String,
    pub op: WriteOp,
}

impl PendingWrite {
    pub fn targets(&self, cache: &NamedCacheSpec, key: &str) -> bool {
        self.key == key && self.cache.name() == cache.name()
    }

    /// The value a read of the same key would observe once this write lands.
    pub fn visible_value(&self) -> Option<Vec<u8>> {
        match &self.op {
            WriteOp::Put(value) => Some(value.clone()),
            WriteOp::Remove => None,
        }
    }
}

pub(crate) enum Request {
    Read(PendingRead),
    Write(PendingWrite),
    Stop,
}
