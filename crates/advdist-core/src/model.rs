//! Batch, BatchEnvelope, and the versioned blobs that make up `RunState`.

use bytes::Bytes;
use parking_lot::RwLock;

/// The unit of work. `clean` is set while queued free, cleared once
/// perturbation starts; `adv` is set once the worker posts a result.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: u64,
    pub clean: Option<Bytes>,
    pub adv: Option<Bytes>,
    pub extra: Option<String>,
}

impl Batch {
    pub fn new_clean(id: u64, clean: Bytes) -> Self {
        Self {
            id,
            clean: Some(clean),
            adv: None,
            extra: None,
        }
    }
}

/// In-flight bookkeeping: the batch plus the model-state version it was
/// dispatched under (its dispatch stamp).
#[derive(Debug, Clone)]
pub struct BatchEnvelope {
    pub batch: Batch,
    pub dispatch_stamp: u64,
}

/// A byte blob plus its monotonic version counter, read/written under a
/// single reader/writer lock so increments and payload swaps are atomic
/// with respect to readers.
#[derive(Default)]
pub struct VersionedBlob {
    state: RwLock<BlobState>,
}

#[derive(Default, Clone)]
struct BlobState {
    data: Bytes,
    version: u64,
}

impl VersionedBlob {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current payload and version, taken under one shared-lock snapshot.
    pub fn read(&self) -> (Bytes, u64) {
        let guard = self.state.read();
        (guard.data.clone(), guard.version)
    }

    pub fn version(&self) -> u64 {
        self.state.read().version
    }

    /// Replace the payload and bump the version. Version increments are
    /// not content-addressed: an identical payload still bumps the
    /// counter.
    pub fn set(&self, data: Bytes) -> u64 {
        let mut guard = self.state.write();
        guard.data = data;
        guard.version += 1;
        guard.version
    }

    pub fn reset(&self) {
        let mut guard = self.state.write();
        guard.data = Bytes::new();
        guard.version = 0;
    }
}

/// The three version counters read together under one atomic snapshot by
/// `GET /ids`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Versions {
    pub attack_id: u64,
    pub model_id: u64,
    pub model_state_id: u64,
}

/// Mutable run parameters set by `POST /parameters`.
#[derive(Debug, Clone, Copy)]
pub struct RunParams {
    pub max_patience: u64,
    pub queue_limit: u64,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            max_patience: 0,
            queue_limit: 0,
        }
    }
}
