//! Stream identifier allocation.

use crate::frame::{StreamId, MAX_STREAM_ID};

/// A lazy sequence of 31-bit stream identifiers of one parity.
///
/// Clients allocate odd ids starting at 1, servers even ids starting at 2,
/// so both sides can open streams without coordination. The sequence is
/// monotonic until it passes 2^31 - 1, then wraps to its start and scans
/// forward for an id the caller reports as free. `next` returns `None` only
/// once a full cycle finds every id in use.
#[derive(Debug, Clone)]
pub struct StreamIds {
    start: StreamId,
    next: StreamId,
}

impl StreamIds {
    /// Odd identifiers: 1, 3, 5, …
    pub fn client() -> Self {
        Self { start: 1, next: 1 }
    }

    /// Even identifiers: 2, 4, 6, …
    pub fn server() -> Self {
        Self { start: 2, next: 2 }
    }

    /// Produces the next free identifier, consulting `in_use` for liveness.
    ///
    /// Callers hold the registry lock across this call so that allocation
    /// and registration are atomic. The scan is bounded by one full pass over
    /// the id space of this parity.
    pub fn next(&mut self, in_use: impl FnMut(StreamId) -> bool) -> Option<StreamId> {
        self.next_bounded(MAX_STREAM_ID, in_use)
    }

    fn next_bounded(
        &mut self,
        max: StreamId,
        mut in_use: impl FnMut(StreamId) -> bool,
    ) -> Option<StreamId> {
        let capacity = (max - self.start) / 2 + 1;
        for _ in 0..capacity {
            let id = self.next;
            self.next = if id + 2 > max { self.start } else { id + 2 };
            if !in_use(id) {
                return Some(id);
            }
        }
        None
    }
}
