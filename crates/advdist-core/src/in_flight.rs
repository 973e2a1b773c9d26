//! The inFlight map: `batchID -> BatchEnvelope`, with atomic take
//! semantics.

use dashmap::DashMap;

use crate::model::BatchEnvelope;

/// Concurrent map from batch id to its in-flight envelope. `DashMap`'s
/// sharded-lock design gives the "remove-if-present, returning whether
/// the entry existed" primitive needed here, so `POST /adv_batch` and
/// the staleness sweep can race on the same id without either one
/// observing a half-removed entry.
#[derive(Default)]
pub struct InFlight {
    map: DashMap<u64, BatchEnvelope>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: u64, envelope: BatchEnvelope) {
        self.map.insert(id, envelope);
    }

    /// Atomic load-and-delete: removes the id if present and returns its
    /// envelope, or `None` if it was already gone (a concurrent sweep or
    /// a second `POST /adv_batch` for the same id).
    pub fn take(&self, id: u64) -> Option<BatchEnvelope> {
        self.map.remove(&id).map(|(_, env)| env)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&self) {
        self.map.clear();
    }

    /// Ids whose dispatch stamp is stale relative to `now`, i.e. those
    /// satisfying `now - stamp > max_patience` under 64-bit unsigned
    /// subtraction. Collected as a snapshot so the caller can `take`
    /// each one individually and push it onto the free queue without
    /// holding any shard lock across an await point.
    pub fn stale_ids(&self, now: u64, max_patience: u64) -> Vec<u64> {
        self.map
            .iter()
            .filter(|entry| now.wrapping_sub(entry.dispatch_stamp) > max_patience)
            .map(|entry| *entry.key())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crate::model::Batch;

    fn envelope(id: u64, stamp: u64) -> BatchEnvelope {
        BatchEnvelope {
            batch: Batch::new_clean(id, Bytes::from_static(b"x")),
            dispatch_stamp: stamp,
        }
    }

    #[test]
    fn take_is_atomic_and_idempotent() {
        let flight = InFlight::new();
        flight.insert(1, envelope(1, 0));
        assert!(flight.take(1).is_some());
        assert!(flight.take(1).is_none());
    }

    #[test]
    fn stale_ids_respects_patience_window() {
        let flight = InFlight::new();
        flight.insert(1, envelope(1, 0));
        flight.insert(2, envelope(2, 5));
        let stale = flight.stale_ids(6, 1);
        assert_eq!(stale, vec![1]);
    }
}
