//! Effective configuration with provenance
//!
//! Records the merged configuration plus where each contributing layer came
//! from, so a summary can say which file or variable set the unlock interval.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::actor::{ActorConfig, ActorSection};
use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;

/// Environment variable overriding the unlock interval, in milliseconds.
pub const UNLOCK_INTERVAL_ENV: &str = "HISTORY_CACHE_UNLOCK_INTERVAL_MS";

/// Longest accepted unlock interval (one hour).
const MAX_UNLOCK_INTERVAL_MS: u64 = 3_600_000;

/// Origin of a configuration layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Env,
    Cli,
}

/// A contributing layer with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path or variable name (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 of the raw file bytes (files only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Merged configuration plus its sources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub config: Value,
    pub sources: Vec<ConfigSource>,
}

impl EffectiveConfig {
    /// Build from the process environment.
    pub fn build(config_path: Option<&Path>, cli_overrides: Option<Value>) -> Result<Self, ConfigError> {
        Self::build_with_env(config_path, cli_overrides, |name| std::env::var(name).ok())
    }

    /// Build with an explicit environment lookup.
    pub fn build_with_env(
        config_path: Option<&Path>,
        cli_overrides: Option<Value>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut layers = vec![BuiltinDefaults::default().to_value()];
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        if let Some(path) = config_path {
            let (value, digest) = Self::load_toml_file(path)?;
            layers.push(value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.to_string_lossy().to_string()),
                digest: Some(digest),
            });
        }

        if let Some(raw) = env(UNLOCK_INTERVAL_ENV) {
            let millis: u64 = raw.trim().parse().map_err(|_| {
                ConfigError::ParseError(format!("{} must be an integer, got {:?}", UNLOCK_INTERVAL_ENV, raw))
            })?;
            layers.push(serde_json::json!({ "actor": { "unlock_interval_ms": millis } }));
            sources.push(ConfigSource {
                origin: ConfigOrigin::Env,
                path: Some(UNLOCK_INTERVAL_ENV.to_string()),
                digest: None,
            });
        }

        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let config = merge_layers(layers);
        Self::validate_config(&config)?;

        Ok(Self { config, sources })
    }

    /// Resolve the `[actor]` table into an [`ActorConfig`].
    pub fn actor_config(&self) -> Result<ActorConfig, ConfigError> {
        let section = self.config.get("actor").cloned().unwrap_or(Value::Null);
        let section: ActorSection = serde_json::from_value(section)
            .map_err(|e| ConfigError::ParseError(format!("invalid [actor] table: {}", e)))?;
        Ok(section.into())
    }

    fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
        let bytes = fs::read(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let digest = hex::encode(Sha256::digest(&bytes));

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;
        let toml_value: toml::Value = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

        Ok((Self::toml_to_json(toml_value), digest))
    }

    fn toml_to_json(toml: toml::Value) -> Value {
        match toml {
            toml::Value::String(s) => Value::String(s),
            toml::Value::Integer(i) => Value::Number(i.into()),
            toml::Value::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(dt) => Value::String(dt.to_string()),
            toml::Value::Array(arr) => Value::Array(arr.into_iter().map(Self::toml_to_json).collect()),
            toml::Value::Table(table) => Value::Object(
                table
                    .into_iter()
                    .map(|(k, v)| (k, Self::toml_to_json(v)))
                    .collect(),
            ),
        }
    }

    fn validate_config(config: &Value) -> Result<(), ConfigError> {
        let actor = config.get("actor");

        if let Some(interval) = actor
            .and_then(|a| a.get("unlock_interval_ms"))
            .and_then(|v| v.as_u64())
        {
            if interval > MAX_UNLOCK_INTERVAL_MS {
                return Err(ConfigError::ValidationError(format!(
                    "unlock_interval_ms must be at most {}",
                    MAX_UNLOCK_INTERVAL_MS
                )));
            }
        }

        if let Some(timeout) = actor
            .and_then(|a| a.get("lock_timeout_ms"))
            .and_then(|v| v.as_u64())
        {
            if timeout == 0 {
                return Err(ConfigError::ValidationError(
                    "lock_timeout_ms must be greater than 0".to_string(),
                ));
            }
        }

        if let Some(name) = actor.and_then(|a| a.get("thread_name")).and_then(|v| v.as_str()) {
            if name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "thread_name must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Get a config value by dot-separated path
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.config;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(|v| v.as_u64())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
