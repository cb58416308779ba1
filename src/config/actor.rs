//! Resolved actor settings.

use std::time::Duration;

use serde::Deserialize;

use super::defaults::BuiltinDefaults;

/// Settings for one cache access actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorConfig {
    /// Idle time after which the store lock is handed back to other processes.
    pub unlock_interval: Duration,
    /// How long the store may wait to get the lock back.
    pub lock_timeout: Duration,
    pub thread_name: String,
    /// Serve reads from still-queued writes for the same key.
    pub pending_write_lookup: bool,
}

impl Default for ActorConfig {
    fn default() -> Self {
        ActorSection::from(BuiltinDefaults::default()).into()
    }
}

impl ActorConfig {
    pub fn with_unlock_interval(mut self, interval: Duration) -> Self {
        self.unlock_interval = interval;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_pending_write_lookup(mut self, enabled: bool) -> Self {
        self.pending_write_lookup = enabled;
        self
    }
}

/// The `[actor]` table as it appears in the merged configuration.
#[derive(Debug, Deserialize)]
pub(crate) struct ActorSection {
    pub unlock_interval_ms: u64,
    pub lock_timeout_ms: u64,
    pub thread_name: String,
    pub pending_write_lookup: bool,
}

impl From<BuiltinDefaults> for ActorSection {
    fn from(defaults: BuiltinDefaults) -> Self {
        Self {
            unlock_interval_ms: defaults.unlock_interval_ms,
            lock_timeout_ms: defaults.lock_timeout_ms,
            thread_name: defaults.thread_name,
            pending_write_lookup: defaults.pending_write_lookup,
        }
    }
}

impl From<ActorSection> for ActorConfig {
    fn from(section: ActorSection) -> Self {
        Self {
            unlock_interval: Duration::from_millis(section.unlock_interval_ms),
            lock_timeout: Duration::from_millis(section.lock_timeout_ms),
            thread_name: section.thread_name,
            pending_write_lookup: section.pending_write_lookup,
        }
    }
}
