//! Named cache identities and their deferred construction.
//!
//! A cache is declared on any thread as a [`NamedCacheSpec`]; nothing touches
//! the store at that point. The actor builds the concrete named cache the
//! first time a request names it, on its own thread, and keeps it for the
//! rest of the run.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use history_store::{CacheStore, StoreResult};

use crate::error::{CacheError, CacheResult};

/// Name plus key and value types of one logical cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedCacheSpec {
    name: String,
    key_type: String,
    value_type: String,
}

impl NamedCacheSpec {
    pub fn new(
        name: impl Into<String>,
        key_type: impl Into<String>,
        value_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            key_type: key_type.into(),
            value_type: value_type.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// File holding this cache, relative to the store's base directory.
    pub fn file_name(&self) -> String {
        format!("{}.bin", self.name)
    }

    fn same_types(&self, other: &NamedCacheSpec) -> bool {
        self.key_type == other.key_type && self.value_type == other.value_type
    }
}

impl fmt::Display for NamedCacheSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<{}, {}>", self.name, self.key_type, self.value_type)
    }
}

/// Every cache declared on one actor, keyed by name.
#[derive(Debug, Default)]
pub(crate) struct IdentityRegistry {
    declared: Mutex<HashMap<String, Arc<NamedCacheSpec>>>,
}

impl IdentityRegistry {
    /// Declare `spec`, or return the identical earlier declaration.
    pub fn declare(&self, spec: NamedCacheSpec) -> CacheResult<Arc<NamedCacheSpec>> {
        let mut declared = self.declared.lock().map_err(|_| CacheError::ActorPanicked)?;
        match declared.entry(spec.name.clone()) {
            Entry::Occupied(existing) => {
                if existing.get().same_types(&spec) {
                    Ok(Arc::clone(existing.get()))
                } else {
                    Err(CacheError::IdentityConflict {
                        name: spec.name.clone(),
                        existing: existing.get().to_string(),
                        requested: spec.to_string(),
                    })
                }
            }
            Entry::Vacant(slot) => Ok(Arc::clone(slot.insert(Arc::new(spec)))),
        }
    }
}

/// Named caches constructed so far. Lives on the actor thread.
pub(crate) struct LazyCaches<C> {
    built: HashMap<String, C>,
}

impl<C> LazyCaches<C> {
    pub fn new() -> Self {
        Self {
            built: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.built.len()
    }

    /// The cache for `spec`, building it through `store` on first use.
    pub fn get_or_create<S>(&mut self, store: &mut S, spec: &NamedCacheSpec) -> StoreResult<&mut C>
    where
        S: CacheStore<Cache = C>,
    {
        match self.built.entry(spec.name().to_string()) {
            Entry::Occupied(cache) => Ok(cache.into_mut()),
            Entry::Vacant(slot) => {
                let file = store.base_dir().join(spec.file_name());
                let cache = store.create_named_cache(&file)?;
                tracing::debug!(cache = %spec, file = %file.display(), "named cache created");
                Ok(slot.insert(cache))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use history_store::{MemoryStore, NamedCache, StoreProbe};

    #[test]
    fn test_spec_file_name() {
        let spec = NamedCacheSpec::new("taskArtifacts", "String", "json<TaskHistory>");
        assert_eq!(spec.file_name(), "taskArtifacts.bin");
        assert_eq!(spec.to_string(), "taskArtifacts<String, json<TaskHistory>>");
    }

    #[test]
    fn test_redeclare_same_types_shares_identity() {
        let registry = IdentityRegistry::default();
        let first = registry
            .declare(NamedCacheSpec::new("tasks", "String", "utf8"))
            .unwrap();
        let second = registry
            .declare(NamedCacheSpec::new("tasks", "String", "utf8"))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_redeclare_different_types_conflicts() {
        let registry = IdentityRegistry::default();
        registry
            .declare(NamedCacheSpec::new("tasks", "String", "utf8"))
            .unwrap();

        let err = registry
            .declare(NamedCacheSpec::new("tasks", "u64", "utf8"))
            .unwrap_err();
        assert!(matches!(err, CacheError::IdentityConflict { ref name, .. } if name == "tasks"));
    }

    #[test]
    fn test_cache_built_once() {
        let probe = StoreProbe::new();
        let mut store = MemoryStore::open(Arc::clone(&probe));
        let mut caches = LazyCaches::new();
        let spec = NamedCacheSpec::new("tasks", "String", "utf8");

        caches
            .get_or_create(&mut store, &spec)
            .unwrap()
            .put("k", b"v".to_vec())
            .unwrap();
        let value = caches.get_or_create(&mut store, &spec).unwrap().get("k").unwrap();

        assert_eq!(value, Some(b"v".to_vec()));
        assert_eq!(probe.caches_created(), 1);
        assert_eq!(caches.len(), 1);
    }
}
