//! Actor configuration
//!
//! Settings are merged from four layers, later layers winning:
//! 1. Built-in defaults
//! 2. TOML config file (`[actor]` table)
//! 3. Environment (`HISTORY_CACHE_UNLOCK_INTERVAL_MS`)
//! 4. CLI flags

mod actor;
mod defaults;
mod effective;
mod merge;

pub use actor::ActorConfig;
pub use defaults::BuiltinDefaults;
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig, UNLOCK_INTERVAL_ENV};
pub use merge::{deep_merge, merge_layers};
