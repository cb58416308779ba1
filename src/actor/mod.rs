//! The cache access actor.
//!
//! One thread opens the store, holds its exclusive lock and performs every
//! read and write on behalf of the rest of the process. Requests arrive over
//! a channel and are drained into two private queues; each loop iteration
//! services one unit of work, reads first, then writes. When there is nothing
//! to do the actor waits, and once it has been idle past the unlock deadline it
//! waits inside the store's long running operation so other processes can
//! take the lock.

mod metrics;
mod policy;
mod request;
mod shared;

pub use metrics::{format_duration, ActorSummary};
pub use policy::{LockState, UnlockPolicy};
pub use request::RequestToken;
pub use shared::StoreInfo;

pub(crate) use metrics::ActorMetrics;
pub(crate) use request::{PendingRead, PendingWrite, Request, WriteOp};
pub(crate) use shared::ActorShared;

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use history_store::{CacheStore, NamedCache, StoreResult};

use crate::config::ActorConfig;
use crate::lazy::LazyCaches;

/// Opens the store. Called exactly once, on the actor thread.
pub type StoreFactory<S> = Box<dyn FnOnce() -> StoreResult<S> + Send>;

const OWNER_DESCRIPTION: &str = "cache access actor owns the store";
const IDLE_DESCRIPTION: &str = "cache access actor is idle";

/// Position of a request in arrival order.
type Seq = u64;

pub(crate) struct CacheAccessActor<S: CacheStore> {
    inbox: Receiver<Request>,
    shared: Arc<ActorShared>,
    reads: VecDeque<(Seq, PendingRead)>,
    writes: VecDeque<(Seq, PendingWrite)>,
    next_seq: Seq,
    caches: LazyCaches<S::Cache>,
    policy: UnlockPolicy,
    metrics: ActorMetrics,
    pending_write_lookup: bool,
    stop_requested: bool,
}

impl<S: CacheStore> CacheAccessActor<S> {
    pub fn new(inbox: Receiver<Request>, shared: Arc<ActorShared>, config: &ActorConfig) -> Self {
        Self {
            inbox,
            shared,
            reads: VecDeque::new(),
            writes: VecDeque::new(),
            next_seq: 0,
            caches: LazyCaches::new(),
            policy: UnlockPolicy::new(config.unlock_interval, Instant::now()),
            metrics: ActorMetrics::default(),
            pending_write_lookup: config.pending_write_lookup,
            stop_requested: false,
        }
    }

    /// Thread body. Never panics; failures end up in the returned summary.
    pub fn run(mut self, factory: StoreFactory<S>) -> ActorSummary {
        let started = Instant::now();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.open_and_serve(factory)));
        let failed = match outcome {
            Ok(Ok(())) => false,
            Ok(Err(err)) => {
                tracing::error!(error = %err, "cache access actor failed");
                true
            }
            Err(payload) => {
                tracing::error!(panic = panic_message(payload.as_ref()), "cache access actor panicked");
                true
            }
        };
        if failed {
            self.shared.mark_failed();
        }

        // Requests that raced the shutdown are counted, then dropped with
        // their reply channels so nobody waits on them.
        self.collect_pending();
        let summary = self.summarize(started.elapsed(), failed);
        tracing::info!(
            outstanding_reads = summary.outstanding_reads,
            outstanding_writes = summary.outstanding_writes,
            caches = self.caches.len(),
            "cache access actor finished. {}",
            summary
        );

        self.shared.finish(summary.clone());
        drop(self);
        summary
    }

    fn open_and_serve(&mut self, factory: StoreFactory<S>) -> StoreResult<()> {
        let mut store = factory()?;
        self.shared.publish_store(StoreInfo::new(store.base_dir()));
        tracing::debug!(base_dir = %store.base_dir().display(), "store opened");

        store.use_under_exclusive_lock(OWNER_DESCRIPTION, |store| self.serve(store))??;
        store.close()
    }

    fn serve(&mut self, store: &mut S) -> StoreResult<()> {
        self.policy = UnlockPolicy::new(self.policy.interval(), Instant::now());
        loop {
            self.collect_pending();
            if let Some((seq, read)) = self.reads.pop_front() {
                self.answer(store, seq, read)?;
            } else if let Some((_, write)) = self.writes.pop_front() {
                self.apply(store, write)?;
            } else if self.stop_requested {
                return Ok(());
            } else {
                self.idle(store)?;
            }
        }
    }

    fn idle(&mut self, store: &mut S) -> StoreResult<()> {
        let now = Instant::now();
        if self.policy.is_release_due(now) {
            self.policy.on_release(now);
            tracing::debug!(release_count = self.policy.release_count(), "releasing store lock while idle");

            let inbox = &self.inbox;
            let received = store.run_long_operation(IDLE_DESCRIPTION, || inbox.recv().ok())?;

            let released_for = self.policy.on_reacquire(Instant::now());
            self.metrics.record_idle(released_for, true);
            tracing::debug!(released_for = %format_duration(released_for), "store lock reacquired");
            self.wake(received);
        } else {
            let received = match self.policy.deadline() {
                Some(deadline) => self.inbox.recv_deadline(deadline),
                None => self
                    .inbox
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };
            let received = match received {
                Ok(request) => Some(request),
                Err(RecvTimeoutError::Timeout) => {
                    self.metrics.record_idle(now.elapsed(), false);
                    return Ok(());
                }
                Err(RecvTimeoutError::Disconnected) => None,
            };
            self.metrics.record_idle(now.elapsed(), false);
            self.wake(received);
        }
        Ok(())
    }

    /// `None` means every sender is gone, which is treated as a stop.
    fn wake(&mut self, received: Option<Request>) {
        match received {
            Some(request) => self.enqueue(request),
            None => self.stop_requested = true,
        }
    }

    fn collect_pending(&mut self) {
        loop {
            match self.inbox.try_recv() {
                Ok(request) => self.enqueue(request),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.stop_requested = true;
                    break;
                }
            }
        }
    }

    fn enqueue(&mut self, request: Request) {
        let seq = self.next_seq;
        self.next_seq += 1;
        match request {
            Request::Read(read) => self.reads.push_back((seq, read)),
            Request::Write(write) => self.writes.push_back((seq, write)),
            Request::Stop => self.stop_requested = true,
        }
    }

    /// Newest write queued ahead of `seq` for the read's cache and key.
    fn queued_value(&self, seq: Seq, read: &PendingRead) -> Option<Option<Vec<u8>>> {
        self.writes
            .iter()
            .rev()
            .filter(|(write_seq, _)| *write_seq < seq)
            .find(|(_, write)| write.targets(&read.cache, &read.key))
            .map(|(_, write)| write.visible_value())
    }

    fn answer(&mut self, store: &mut S, seq: Seq, read: PendingRead) -> StoreResult<()> {
        let queued = if self.pending_write_lookup {
            self.queued_value(seq, &read)
        } else {
            None
        };

        let value = match queued {
            Some(value) => {
                self.metrics.reads_from_pending_writes += 1;
                value
            }
            None => self.caches.get_or_create(store, &read.cache)?.get(&read.key)?,
        };
        self.metrics.reads_served += 1;
        tracing::debug!(
            token = %read.token,
            cache = read.cache.name(),
            found = value.is_some(),
            "read served"
        );

        // The caller may have given up; nothing to do then.
        let _ = read.reply.send(value);
        Ok(())
    }

    fn apply(&mut self, store: &mut S, write: PendingWrite) -> StoreResult<()> {
        let cache = self.caches.get_or_create(store, &write.cache)?;
        let kind = match write.op {
            WriteOp::Put(value) => {
                cache.put(&write.key, value)?;
                "put"
            }
            WriteOp::Remove => {
                cache.remove(&write.key)?;
                "remove"
            }
        };
        self.metrics.writes_applied += 1;
        tracing::debug!(cache = write.cache.name(), op = kind, "write applied");
        Ok(())
    }

    fn summarize(&self, total: Duration, failed: bool) -> ActorSummary {
        ActorSummary {
            total,
            busy: total.saturating_sub(self.metrics.idle),
            idle: self.metrics.idle,
            blocked_reads: self.shared.blocked(),
            lock_released: self.metrics.lock_released,
            lock_release_count: self.policy.release_count(),
            reads_served: self.metrics.reads_served,
            reads_from_pending_writes: self.metrics.reads_from_pending_writes,
            writes_applied: self.metrics.writes_applied,
            outstanding_reads: self.reads.len(),
            outstanding_writes: self.writes.len(),
            failed,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
