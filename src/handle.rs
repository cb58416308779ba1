//! Typed cache handles.
//!
//! A [`CacheHandle`] looks like an ordinary key/value map but never touches
//! the store: `get` sends a read to the actor and blocks for its answer, while
//! `put` and `remove` are queued and return immediately.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{bounded, Sender};
use history_store::{encode_key, ValueSerializer};
use serde::Serialize;

use crate::actor::{ActorShared, PendingRead, PendingWrite, Request, RequestToken, WriteOp};
use crate::error::CacheResult;
use crate::lazy::NamedCacheSpec;

/// Handle to one named cache. Cheap to clone and safe to share across threads.
pub struct CacheHandle<K: ?Sized, V> {
    spec: Arc<NamedCacheSpec>,
    serializer: Arc<dyn ValueSerializer<V>>,
    requests: Sender<Request>,
    shared: Arc<ActorShared>,
    _key: PhantomData<fn(&K)>,
}

impl<K, V> CacheHandle<K, V>
where
    K: Serialize + ?Sized,
{
    pub(crate) fn new(
        spec: Arc<NamedCacheSpec>,
        serializer: Arc<dyn ValueSerializer<V>>,
        requests: Sender<Request>,
        shared: Arc<ActorShared>,
    ) -> Self {
        Self {
            spec,
            serializer,
            requests,
            shared,
            _key: PhantomData,
        }
    }

    /// Read `key`, blocking until the actor answers.
    ///
    /// Returns `Ok(None)` for absent keys. Fails with
    /// [`CacheError::StopRequested`](crate::CacheError::StopRequested) when the
    /// actor stops before answering.
    pub fn get(&self, key: &K) -> CacheResult<Option<V>> {
        self.shared.check_accepting()?;
        let key = encode_key(key)?;
        let token = RequestToken::new();
        let (reply, answer) = bounded(1);

        tracing::trace!(cache = self.spec.name(), token = %token, "read queued");
        self.send(Request::Read(PendingRead {
            token,
            cache: Arc::clone(&self.spec),
            key,
            reply,
        }))?;

        let waiting = Instant::now();
        let answer = answer.recv();
        self.shared.record_blocked(waiting.elapsed());

        match answer {
            Ok(Some(bytes)) => Ok(Some(self.serializer.deserialize(&bytes)?)),
            Ok(None) => Ok(None),
            Err(_) => Err(self.shared.disconnected_error()),
        }
    }

    /// Queue a write of `value` under `key`.
    pub fn put(&self, key: &K, value: &V) -> CacheResult<()> {
        self.shared.check_accepting()?;
        let key = encode_key(key)?;
        let value = self.serializer.serialize(value)?;
        self.write(key, WriteOp::Put(value))
    }

    /// Queue removal of `key`.
    pub fn remove(&self, key: &K) -> CacheResult<()> {
        self.shared.check_accepting()?;
        let key = encode_key(key)?;
        self.write(key, WriteOp::Remove)
    }

    fn write(&self, key: String, op: WriteOp) -> CacheResult<()> {
        self.send(Request::Write(PendingWrite {
            cache: Arc::clone(&self.spec),
            key,
            op,
        }))
    }

    fn send(&self, request: Request) -> CacheResult<()> {
        self.requests
            .send(request)
            .map_err(|_| self.shared.disconnected_error())
    }
}

impl<K: ?Sized, V> Clone for CacheHandle<K, V> {
    fn clone(&self) -> Self {
        Self {
            spec: Arc::clone(&self.spec),
            serializer: Arc::clone(&self.serializer),
            requests: self.requests.clone(),
            shared: Arc::clone(&self.shared),
            _key: PhantomData,
        }
    }
}

impl<K: ?Sized, V> fmt::Debug for CacheHandle<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheHandle")
            .field("cache", &self.spec.to_string())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crossbeam_channel::{unbounded, Receiver};
    use history_store::StringSerializer;
    use std::thread;

    /// A started handle whose requests land in the returned inbox instead of
    /// an actor.
    fn handle_over(shared: &Arc<ActorShared>) -> (CacheHandle<str, String>, Receiver<Request>) {
        let (requests, inbox) = unbounded();
        let spec = Arc::new(NamedCacheSpec::new("tasks", "str", "utf8"));
        let handle = CacheHandle::new(spec, Arc::new(StringSerializer), requests, Arc::clone(shared));
        shared.mark_started();
        (handle, inbox)
    }

    #[test]
    fn test_get_blocked_across_stop_is_stop_requested() {
        let shared = Arc::new(ActorShared::default());
        let (handle, inbox) = handle_over(&shared);

        let reader = thread::spawn(move || handle.get("a"));
        let pending = inbox.recv().unwrap();
        assert!(matches!(pending, Request::Read(ref read) if read.key == "\"a\""));

        // The reader is parked on its reply channel when the stop lands.
        shared.request_stop();
        drop(pending);
        drop(inbox);

        assert!(matches!(reader.join().unwrap(), Err(CacheError::StopRequested)));
    }

    #[test]
    fn test_get_blocked_when_actor_dies_is_actor_failed() {
        let shared = Arc::new(ActorShared::default());
        let (handle, inbox) = handle_over(&shared);

        let reader = thread::spawn(move || handle.get("a"));
        let pending = inbox.recv().unwrap();
        drop(pending);
        drop(inbox);

        assert!(matches!(reader.join().unwrap(), Err(CacheError::ActorFailed)));
    }

    #[test]
    fn test_write_to_vanished_actor_is_actor_failed() {
        let shared = Arc::new(ActorShared::default());
        let (handle, inbox) = handle_over(&shared);
        drop(inbox);

        let err = handle.put("a", &"1".to_string()).unwrap_err();
        assert!(matches!(err, CacheError::ActorFailed));
        assert!(matches!(handle.get("a"), Err(CacheError::ActorFailed)));
    }

    #[test]
    fn test_requests_after_stop_fail_fast() {
        let shared = Arc::new(ActorShared::default());
        let (handle, inbox) = handle_over(&shared);
        shared.request_stop();

        assert!(handle.get("a").unwrap_err().is_stop_requested());
        assert!(handle.remove("a").unwrap_err().is_stop_requested());
        assert!(inbox.try_recv().is_err());
    }
}
