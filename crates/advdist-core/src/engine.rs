//! `Engine` bundles the versioned blobs, the three queues, the setup
//! barrier, and the id allocator into the single piece of shared state
//! the coordinator's handlers hold.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::barrier::SetupBarrier;
use crate::in_flight::InFlight;
use crate::model::{Batch, BatchEnvelope, RunParams, VersionedBlob, Versions};
use crate::queues::BoundedQueue;

pub struct Engine {
    attack: VersionedBlob,
    model: VersionedBlob,
    model_state: VersionedBlob,
    params: Mutex<RunParams>,
    next_batch_id: Mutex<u64>,
    free: Arc<BoundedQueue>,
    done: Arc<BoundedQueue>,
    in_flight: InFlight,
    barrier: SetupBarrier,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self {
            attack: VersionedBlob::new(),
            model: VersionedBlob::new(),
            model_state: VersionedBlob::new(),
            params: Mutex::new(RunParams::default()),
            next_batch_id: Mutex::new(0),
            free: Arc::new(BoundedQueue::new(1)),
            done: Arc::new(BoundedQueue::new(1)),
            in_flight: InFlight::new(),
            barrier: SetupBarrier::new(),
        }
    }

    pub fn barrier(&self) -> &SetupBarrier {
        &self.barrier
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    pub fn free(&self) -> &BoundedQueue {
        &self.free
    }

    pub fn done(&self) -> &BoundedQueue {
        &self.done
    }

    pub fn params(&self) -> RunParams {
        *self.params.lock()
    }

    pub fn attack(&self) -> (Bytes, u64) {
        self.attack.read()
    }

    pub fn model(&self) -> (Bytes, u64) {
        self.model.read()
    }

    pub fn model_state(&self) -> (Bytes, u64) {
        self.model_state.read()
    }

    pub fn versions(&self) -> Versions {
        // Each counter is read independently; GET /ids only needs each
        // of the three reads to be individually monotonic, not a
        // linearizable snapshot across all three blobs.
        Versions {
            attack_id: self.attack.version(),
            model_id: self.model.version(),
            model_state_id: self.model_state.version(),
        }
    }

    pub fn set_attack(&self, data: Bytes) -> u64 {
        self.attack.set(data)
    }

    pub fn set_model(&self, data: Bytes) -> u64 {
        self.model.set(data)
    }

    /// Sets the model-state blob and runs the staleness sweep against the
    /// new version.
    pub async fn set_model_state(&self, data: Bytes) -> (u64, usize) {
        let new_version = self.model_state.set(data);
        let swept = self.sweep(new_version).await;
        (new_version, swept)
    }

    /// Scan inFlight for envelopes whose dispatch stamp lags `now` by
    /// more than `maxPatience`, reclaiming each one back onto the free
    /// queue. The atomic `take` happens synchronously for every id
    /// before any re-enqueue is attempted, so inFlight membership is
    /// fully settled before this function does anything that could
    /// suspend.
    pub async fn sweep(&self, now: u64) -> usize {
        let max_patience = self.params.lock().max_patience;
        let stale_ids = self.in_flight.stale_ids(now, max_patience);
        let mut reclaimed = Vec::with_capacity(stale_ids.len());
        for id in stale_ids {
            if let Some(envelope) = self.in_flight.take(id) {
                reclaimed.push(envelope.batch);
            }
        }
        let count = reclaimed.len();
        for mut batch in reclaimed {
            // Re-enqueued batch keeps its id and clean payload; adv stays empty.
            batch.adv = None;
            batch.extra = None;
            let _ = self.free.push(batch).await;
        }
        count
    }

    /// Allocate the next batch id. The mutex is held only long enough to
    /// read-and-increment; the caller fills the payload after releasing it.
    pub fn next_batch_id(&self) -> u64 {
        let mut guard = self.next_batch_id.lock();
        let id = *guard;
        *guard += 1;
        id
    }

    /// Move a batch from free into inFlight, stamping it with the
    /// current model-state version (`GET /clean_batch`).
    pub async fn dispatch_clean_batch(&self) -> Option<Batch> {
        let batch = self.free.pop().await?;
        let stamp = self.model_state.version();
        let envelope = BatchEnvelope {
            batch: batch.clone(),
            dispatch_stamp: stamp,
        };
        self.in_flight.insert(batch.id, envelope);
        Some(batch)
    }

    /// Move a batch from inFlight into done (`POST /adv_batch`). Returns
    /// `false` if `id` was not in inFlight: a silent no-op (unknown id,
    /// already swept, or a duplicate post).
    pub async fn complete_batch(&self, id: u64, adv: Bytes, extra: Option<String>) -> bool {
        match self.in_flight.take(id) {
            Some(envelope) => {
                let mut batch = envelope.batch;
                batch.clean = None;
                batch.adv = Some(adv);
                batch.extra = extra;
                let _ = self.done.push(batch).await;
                true
            }
            None => false,
        }
    }

    /// `POST /parameters`: set maxPatience/queueLimit and (re)create the
    /// free/done queues at the new capacity. Must happen before the
    /// queues start filling.
    pub fn reconfigure(&self, params: RunParams) {
        *self.params.lock() = params;
        self.free.reset(params.queue_limit);
        self.done.reset(params.queue_limit);
    }

    /// `POST /reset`: re-arm the barrier, drain and recreate both
    /// queues, clear inFlight, and zero every version counter.
    pub fn reset(&self) {
        self.barrier.reset();
        let params = self.params();
        self.free.reset(params.queue_limit.max(1));
        self.done.reset(params.queue_limit.max(1));
        self.in_flight.clear();
        self.attack.reset();
        self.model.reset();
        self.model_state.reset();
        *self.params.lock() = RunParams::default();
        *self.next_batch_id.lock() = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Batch;

    fn new_configured(queue_limit: u64, max_patience: u64) -> Engine {
        let engine = Engine::new();
        engine.reconfigure(RunParams {
            max_patience,
            queue_limit,
        });
        engine
    }

    #[tokio::test]
    async fn happy_path_dispatch_and_complete() {
        let engine = new_configured(2, 5);
        let id = engine.next_batch_id();
        engine
            .free()
            .push(Batch::new_clean(id, Bytes::from_static(b"clean")))
            .await
            .unwrap();

        let dispatched = engine.dispatch_clean_batch().await.unwrap();
        assert_eq!(dispatched.id, id);
        assert_eq!(engine.in_flight().len(), 1);

        let accepted = engine
            .complete_batch(id, Bytes::from_static(b"adv"), Some("A".to_string()))
            .await;
        assert!(accepted);
        assert!(engine.in_flight().is_empty());

        let done = engine.done().pop().await.unwrap();
        assert_eq!(done.adv.as_deref(), Some(&b"adv"[..]));
        assert_eq!(done.extra.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn staleness_sweep_reclaims_and_drops_late_post() {
        let engine = new_configured(1, 1);
        let id = engine.next_batch_id();
        engine
            .free()
            .push(Batch::new_clean(id, Bytes::from_static(b"clean")))
            .await
            .unwrap();
        engine.dispatch_clean_batch().await.unwrap();

        // modelStateID now = 0 (dispatch stamp). Two updates -> now = 2,
        // 2 - 0 > 1, so the envelope is stale.
        engine.set_model_state(Bytes::from_static(b"m1")).await;
        let (_, swept) = engine.set_model_state(Bytes::from_static(b"m2")).await;
        assert_eq!(swept, 1);
        assert!(engine.in_flight().is_empty());

        let accepted = engine
            .complete_batch(id, Bytes::from_static(b"late"), None)
            .await;
        assert!(!accepted);

        let requeued = engine.dispatch_clean_batch().await.unwrap();
        assert_eq!(requeued.id, id);
        assert_eq!(requeued.clean.as_deref(), Some(&b"clean"[..]));
        assert!(requeued.adv.is_none());
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let engine = new_configured(1, 5);
        let id = engine.next_batch_id();
        engine
            .free()
            .push(Batch::new_clean(id, Bytes::from_static(b"clean")))
            .await
            .unwrap();
        engine.dispatch_clean_batch().await.unwrap();
        engine.set_attack(Bytes::from_static(b"atk"));

        engine.reset();

        assert!(engine.in_flight().is_empty());
        assert_eq!(engine.versions().attack_id, 0);
        assert_eq!(engine.versions().model_state_id, 0);
        assert!(!engine.barrier().is_open());
    }
}
