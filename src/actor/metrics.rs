//! Actor timing metrics and the end-of-run summary.

use std::fmt;
use std::time::Duration;

/// Counters kept privately by the actor thread.
#[derive(Debug, Default, Clone)]
pub(crate) struct ActorMetrics {
    pub idle: Duration,
    pub lock_released: Duration,
    pub reads_served: u64,
    pub reads_from_pending_writes: u64,
    pub writes_applied: u64,
}

impl ActorMetrics {
    pub fn record_idle(&mut self, waited: Duration, lock_released: bool) {
        self.idle += waited;
        if lock_released {
            self.lock_released += waited;
        }
    }
}

/// What the actor did over its whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActorSummary {
    /// Wall time between thread start and loop exit.
    pub total: Duration,
    pub busy: Duration,
    pub idle: Duration,
    /// Time callers spent blocked waiting for read answers, as of the
    /// moment `stop` joined the actor thread.
    pub blocked_reads: Duration,
    /// Idle time spent with the store lock given up.
    pub lock_released: Duration,
    pub lock_release_count: u64,
    pub reads_served: u64,
    /// Reads answered from a queued write instead of the store.
    pub reads_from_pending_writes: u64,
    pub writes_applied: u64,
    pub outstanding_reads: usize,
    pub outstanding_writes: usize,
    /// The loop ended because of a store failure.
    pub failed: bool,
}

impl fmt::Display for ActorSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Busy: {}, idle: {}, blocked reads: {}, lock released: {}, lock release count: {}",
            format_duration(self.busy),
            format_duration(self.idle),
            format_duration(self.blocked_reads),
            format_duration(self.lock_released),
            self.lock_release_count
        )
    }
}

/// Human-readable duration: `850ms`, `2.35s`, `3m 4.1s`.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        let minutes = duration.as_secs() / 60;
        let seconds = duration.as_secs_f64() - (minutes * 60) as f64;
        format!("{}m {:.1}s", minutes, seconds)
    }
}
