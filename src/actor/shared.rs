//! State shared between the actor thread, its controller and cache handles.
//!
//! Everything here is atomics or set-once; the queues themselves live only on
//! the actor thread.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::metrics::ActorSummary;
use crate::error::{CacheError, CacheResult};

/// Description of the store opened by the actor.
///
/// The store itself never leaves the actor thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInfo {
    pub base_dir: PathBuf,
    pub opened_at: DateTime<Utc>,
}

impl StoreInfo {
    pub(crate) fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
            opened_at: Utc::now(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ActorShared {
    started: AtomicBool,
    stop_requested: AtomicBool,
    failed: AtomicBool,
    stopped: AtomicBool,
    blocked_nanos: AtomicU64,
    store: OnceLock<StoreInfo>,
    summary: Mutex<Option<ActorSummary>>,
}

impl ActorShared {
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Fail fast unless new work can still be accepted.
    pub fn check_accepting(&self) -> CacheResult<()> {
        if !self.is_started() {
            Err(CacheError::NotStarted)
        } else if self.is_stop_requested() {
            Err(CacheError::StopRequested)
        } else if self.failed.load(Ordering::SeqCst) || self.is_stopped() {
            Err(CacheError::ActorFailed)
        } else {
            Ok(())
        }
    }

    /// The error a caller sees when the actor went away under it.
    pub fn disconnected_error(&self) -> CacheError {
        if self.is_stop_requested() {
            CacheError::StopRequested
        } else {
            CacheError::ActorFailed
        }
    }

    pub fn record_blocked(&self, waited: Duration) {
        let nanos = u64::try_from(waited.as_nanos()).unwrap_or(u64::MAX);
        self.blocked_nanos.fetch_add(nanos, Ordering::SeqCst);
    }

    pub fn blocked(&self) -> Duration {
        Duration::from_nanos(self.blocked_nanos.load(Ordering::SeqCst))
    }

    pub fn publish_store(&self, info: StoreInfo) {
        let _ = self.store.set(info);
    }

    pub fn store_info(&self) -> CacheResult<StoreInfo> {
        self.store.get().cloned().ok_or(CacheError::NotStarted)
    }

    pub fn finish(&self, summary: ActorSummary) {
        if let Ok(mut slot) = self.summary.lock() {
            *slot = Some(summary);
        }
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Record that the actor thread is gone without leaving a summary.
    pub fn mark_abandoned(&self) {
        self.failed.store(true, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn summary(&self) -> Option<ActorSummary> {
        self.summary.lock().ok().and_then(|s| s.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepting_transitions() {
        let shared = ActorShared::default();
        assert!(matches!(shared.check_accepting(), Err(CacheError::NotStarted)));

        shared.mark_started();
        assert!(shared.check_accepting().is_ok());

        shared.request_stop();
        assert!(matches!(shared.check_accepting(), Err(CacheError::StopRequested)));
        assert!(matches!(shared.disconnected_error(), CacheError::StopRequested));
    }

    #[test]
    fn test_failure_without_stop() {
        let shared = ActorShared::default();
        shared.mark_started();
        shared.mark_failed();

        assert!(matches!(shared.check_accepting(), Err(CacheError::ActorFailed)));
        assert!(matches!(shared.disconnected_error(), CacheError::ActorFailed));
    }

    #[test]
    fn test_store_info_set_once() {
        let shared = ActorShared::default();
        assert!(matches!(shared.store_info(), Err(CacheError::NotStarted)));

        shared.publish_store(StoreInfo::new(Path::new("/tmp/a")));
        shared.publish_store(StoreInfo::new(Path::new("/tmp/b")));

        assert_eq!(shared.store_info().unwrap().base_dir, PathBuf::from("/tmp/a"));
    }

    #[test]
    fn test_abandoned_actor_is_stopped_without_summary() {
        let shared = ActorShared::default();
        shared.mark_started();
        shared.mark_abandoned();

        assert!(shared.is_stopped());
        assert!(shared.summary().is_none());
        assert!(matches!(shared.check_accepting(), Err(CacheError::ActorFailed)));
    }

    #[test]
    fn test_blocked_time_accumulates() {
        let shared = ActorShared::default();
        shared.record_blocked(Duration::from_millis(5));
        shared.record_blocked(Duration::from_millis(7));
        assert_eq!(shared.blocked(), Duration::from_millis(12));
    }
}
