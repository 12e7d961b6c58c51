//! Registry of live streams.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::RequestError;
use crate::frame::StreamId;
use crate::handle::StreamHandle;
use crate::stream_id::StreamIds;

/// Maps stream ids to their handles.
///
/// One lock covers both the id allocator and the map, so an id is never
/// handed out twice and registration is atomic with allocation. The lock is
/// only held for map operations, never across an enqueue on the outbound
/// sender or any other await point.
pub(crate) struct StreamRegistry {
    inner: Mutex<Inner>,
}

struct Inner {
    ids: StreamIds,
    streams: HashMap<StreamId, Arc<StreamHandle>>,
}

impl StreamRegistry {
    pub fn new(ids: StreamIds) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ids,
                streams: HashMap::new(),
            }),
        }
    }

    /// Allocates a fresh id, builds the handle for it, and inserts it.
    ///
    /// `build` runs under the registry lock and must not block.
    pub fn register<T>(
        &self,
        build: impl FnOnce(StreamId) -> (Arc<StreamHandle>, T),
    ) -> Result<(Arc<StreamHandle>, T), RequestError> {
        let mut inner = self.inner.lock();
        let Inner { ids, streams } = &mut *inner;
        let id = ids
            .next(|id| streams.contains_key(&id))
            .ok_or(RequestError::StreamIdsExhausted)?;
        let (handle, extra) = build(id);
        streams.insert(id, handle.clone());
        Ok((handle, extra))
    }

    /// Allocates an id without keeping any state, for fire-and-forget requests.
    pub fn allocate(&self) -> Result<StreamId, RequestError> {
        let mut inner = self.inner.lock();
        let Inner { ids, streams } = &mut *inner;
        ids.next(|id| streams.contains_key(&id))
            .ok_or(RequestError::StreamIdsExhausted)
    }

    pub fn lookup(&self, id: StreamId) -> Option<Arc<StreamHandle>> {
        self.inner.lock().streams.get(&id).cloned()
    }

    /// Removes and returns the handle, transferring ownership to the caller.
    pub fn remove(&self, id: StreamId) -> Option<Arc<StreamHandle>> {
        self.inner.lock().streams.remove(&id)
    }

    /// Removes every handle at once, for connection-wide teardown.
    pub fn drain(&self) -> Vec<Arc<StreamHandle>> {
        self.inner
            .lock()
            .streams
            .drain()
            .map(|(_, handle)| handle)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().streams.len()
    }

    /// Ids of live streams, sorted (for diagnostics).
    pub fn ids(&self) -> Vec<StreamId> {
        let mut ids: Vec<_> = self.inner.lock().streams.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
