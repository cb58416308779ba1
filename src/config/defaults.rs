//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Idle time before the store lock is voluntarily released (default: 2000)
    pub unlock_interval_ms: u64,

    /// Maximum wait when (re)acquiring the store lock (default: 60000)
    pub lock_timeout_ms: u64,

    /// Name of the actor thread (default: "cache-access")
    pub thread_name: String,

    /// Answer reads from queued writes for the same key (default: true)
    pub pending_write_lookup: bool,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            unlock_interval_ms: 2000,
            lock_timeout_ms: 60_000,
            thread_name: "cache-access".to_string(),
            pending_write_lookup: true,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "actor": {
                "unlock_interval_ms": self.unlock_interval_ms,
                "lock_timeout_ms": self.lock_timeout_ms,
                "thread_name": self.thread_name,
                "pending_write_lookup": self.pending_write_lookup
            }
        })
    }
}
