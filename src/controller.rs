//! Lifecycle of a cache access actor.
//!
//! [`CacheActor`] is what the rest of the process holds on to. Caches are
//! declared on it before or after `start`; the store is opened on the actor
//! thread by the factory handed to [`CacheActor::new`], so the store type
//! never has to be `Send`.

use std::any::type_name;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use history_store::{CacheStore, JsonSerializer, StoreResult, ValueSerializer};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::actor::{ActorShared, ActorSummary, CacheAccessActor, Request, StoreFactory, StoreInfo};
use crate::config::ActorConfig;
use crate::error::{CacheError, CacheResult};
use crate::handle::CacheHandle;
use crate::lazy::{IdentityRegistry, NamedCacheSpec};

struct Launch<S> {
    inbox: Receiver<Request>,
    factory: StoreFactory<S>,
}

/// Owner of the actor thread.
///
/// Dropping a running `CacheActor` stops it and waits for the thread.
pub struct CacheActor<S: CacheStore + 'static> {
    config: ActorConfig,
    shared: Arc<ActorShared>,
    requests: Sender<Request>,
    launch: Mutex<Option<Launch<S>>>,
    thread: Mutex<Option<JoinHandle<ActorSummary>>>,
    identities: IdentityRegistry,
    _store: PhantomData<fn() -> S>,
}

impl<S: CacheStore + 'static> CacheActor<S> {
    /// Prepare an actor. `open_store` runs later, on the actor thread.
    pub fn new<F>(open_store: F, config: ActorConfig) -> Self
    where
        F: FnOnce() -> StoreResult<S> + Send + 'static,
    {
        let (requests, inbox) = unbounded();
        Self {
            config,
            shared: Arc::new(ActorShared::default()),
            requests,
            launch: Mutex::new(Some(Launch {
                inbox,
                factory: Box::new(open_store),
            })),
            thread: Mutex::new(None),
            identities: IdentityRegistry::default(),
            _store: PhantomData,
        }
    }

    pub fn config(&self) -> &ActorConfig {
        &self.config
    }

    /// Spawn the actor thread. Only the first call does anything.
    pub fn start(&self) -> CacheResult<()> {
        let launch = self
            .launch
            .lock()
            .map_err(|_| CacheError::ActorPanicked)?
            .take()
            .ok_or(CacheError::AlreadyStarted)?;

        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let handle = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || {
                CacheAccessActor::<S>::new(launch.inbox, shared, &config).run(launch.factory)
            })
            .map_err(CacheError::Spawn)?;

        *self.thread.lock().map_err(|_| CacheError::ActorPanicked)? = Some(handle);
        self.shared.mark_started();
        tracing::debug!(
            thread = %self.config.thread_name,
            unlock_interval_ms = self.config.unlock_interval.as_millis() as u64,
            "cache access actor started"
        );
        Ok(())
    }

    /// Stop the actor and wait for it to finish.
    ///
    /// Work queued before the call is completed first. Calling `stop` again
    /// returns the same summary.
    pub fn stop(&self) -> CacheResult<ActorSummary> {
        if !self.shared.is_started() {
            return Err(CacheError::NotStarted);
        }

        let mut thread = self.thread.lock().map_err(|_| CacheError::ActorPanicked)?;
        match thread.take() {
            Some(handle) => {
                self.shared.request_stop();
                // A failed actor has already dropped its inbox.
                let _ = self.requests.send(Request::Stop);
                tracing::debug!("stop requested, waiting for cache access actor");
                match handle.join() {
                    Ok(mut summary) => {
                        // Readers answered last may have recorded their wait
                        // after the actor took its snapshot.
                        summary.blocked_reads = self.shared.blocked();
                        self.shared.finish(summary.clone());
                        Ok(summary)
                    }
                    Err(_) => {
                        self.shared.mark_abandoned();
                        Err(CacheError::ActorPanicked)
                    }
                }
            }
            None => self.shared.summary().ok_or(CacheError::ActorPanicked),
        }
    }

    /// True once the actor loop has exited, for whatever reason.
    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    /// The store the actor opened. `NotStarted` until it has been opened.
    pub fn store_info(&self) -> CacheResult<StoreInfo> {
        self.shared.store_info()
    }

    pub fn summary(&self) -> Option<ActorSummary> {
        self.shared.summary()
    }

    /// Declare a cache whose values are stored as JSON.
    pub fn create_cache<K, V>(&self, name: &str) -> CacheResult<CacheHandle<K, V>>
    where
        K: Serialize + ?Sized,
        V: Serialize + DeserializeOwned + 'static,
    {
        self.create_cache_with_serializer(name, JsonSerializer::<V>::new())
    }

    /// Declare a cache with a custom value serializer.
    pub fn create_cache_with_serializer<K, V, C>(
        &self,
        name: &str,
        serializer: C,
    ) -> CacheResult<CacheHandle<K, V>>
    where
        K: Serialize + ?Sized,
        C: ValueSerializer<V> + 'static,
    {
        let spec = NamedCacheSpec::new(name, type_name::<K>(), serializer.describe());
        let spec = self.identities.declare(spec)?;
        tracing::debug!(cache = %spec, "cache declared");

        Ok(CacheHandle::new(
            spec,
            Arc::new(serializer),
            self.requests.clone(),
            Arc::clone(&self.shared),
        ))
    }
}

impl<S: CacheStore + 'static> Drop for CacheActor<S> {
    fn drop(&mut self) {
        let handle = match self.thread.get_mut() {
            Ok(thread) => thread.take(),
            Err(_) => return,
        };
        if let Some(handle) = handle {
            self.shared.request_stop();
            let _ = self.requests.send(Request::Stop);
            if handle.join().is_err() {
                self.shared.mark_abandoned();
                tracing::error!("cache access actor thread panicked during shutdown");
            }
        }
    }
}
