//! Actor over the on-disk store
//!
//! Persistence across actor runs, and interplay with a second store instance
//! standing in for another process sharing the same directory.

use std::path::Path;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;

use history_cache::history_store::{
    CacheStore, FileStore, LockError, NamedCache, StoreError, StringSerializer,
};
use history_cache::{ActorConfig, CacheActor, CacheHandle};

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

fn file_actor(dir: &Path, config: ActorConfig) -> CacheActor<FileStore> {
    let dir = dir.to_path_buf();
    let timeout = config.lock_timeout;
    CacheActor::new(move || FileStore::open(dir, timeout), config)
}

fn tasks(actor: &CacheActor<FileStore>) -> CacheHandle<str, String> {
    actor
        .create_cache_with_serializer::<str, String, _>("tasks", StringSerializer)
        .unwrap()
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_values_survive_actor_restart() {
    let temp_dir = TempDir::new().unwrap();
    let config = ActorConfig::default().with_lock_timeout(LOCK_TIMEOUT);

    {
        let actor = file_actor(temp_dir.path(), config.clone());
        let cache = tasks(&actor);
        actor.start().unwrap();
        cache.put(":app:compileJava", &"up-to-date".to_string()).unwrap();
        cache.put(":app:test", &"failed".to_string()).unwrap();
        cache.remove(":app:test").unwrap();
        actor.stop().unwrap();
    }

    assert!(temp_dir.path().join("tasks.bin").exists());

    let actor = file_actor(temp_dir.path(), config);
    let cache = tasks(&actor);
    actor.start().unwrap();
    assert_eq!(
        cache.get(":app:compileJava").unwrap().as_deref(),
        Some("up-to-date")
    );
    assert_eq!(cache.get(":app:test").unwrap(), None);

    let info = actor.store_info().unwrap();
    assert_eq!(info.base_dir, temp_dir.path());
    actor.stop().unwrap();
}

// =============================================================================
// Sharing the lock with another process
// =============================================================================

#[test]
fn test_busy_actor_keeps_other_process_out() {
    let temp_dir = TempDir::new().unwrap();
    let config = ActorConfig::default()
        .with_unlock_interval(Duration::from_secs(60))
        .with_lock_timeout(LOCK_TIMEOUT);
    let actor = file_actor(temp_dir.path(), config);
    let cache = tasks(&actor);
    actor.start().unwrap();
    assert_eq!(cache.get("a").unwrap(), None);

    let other = FileStore::open(temp_dir.path(), Duration::from_millis(100));
    assert!(matches!(other, Err(StoreError::Lock(LockError::Timeout(_)))));

    actor.stop().unwrap();
}

#[test]
fn test_other_process_writes_while_lock_released() {
    let temp_dir = TempDir::new().unwrap();
    let config = ActorConfig::default()
        .with_unlock_interval(Duration::from_millis(50))
        .with_lock_timeout(LOCK_TIMEOUT);
    let actor = file_actor(temp_dir.path(), config);
    let cache = tasks(&actor);
    actor.start().unwrap();

    cache.put("a", &"1".to_string()).unwrap();
    assert_eq!(cache.get("a").unwrap().as_deref(), Some("1"));

    // Let the actor go idle long enough to hand the lock over.
    thread::sleep(Duration::from_millis(300));

    let mut other = FileStore::open(temp_dir.path(), LOCK_TIMEOUT).unwrap();
    let mut other_tasks = other
        .create_named_cache(&temp_dir.path().join("tasks.bin"))
        .unwrap();
    assert_eq!(other_tasks.get("\"a\"").unwrap(), Some(b"1".to_vec()));
    other_tasks.put("\"a\"", b"2".to_vec()).unwrap();
    other.close().unwrap();

    assert_eq!(cache.get("a").unwrap().as_deref(), Some("2"));

    let summary = actor.stop().unwrap();
    assert!(summary.lock_release_count >= 1);
}
