//! The data-loader contract: an opaque collaborator that produces one
//! clean batch per call and reports the total batch count. The
//! coordinator bridges `/dataset` and `/data_loader` setup POSTs to it
//! and calls it from a pool of concurrent loader tasks.
//!
//! [`InMemoryDataLoader`] is the in-process reference implementation:
//! it reseeds its batches whenever `set_dataset`/`configure` is called
//! with an 8-byte batch-count payload, so the coordinator's HTTP API
//! alone is enough to drive a working pull/push loop.

use async_trait::async_trait;
use bytes::Bytes;

#[async_trait]
pub trait DataLoader: Send + Sync {
    /// Produce one clean batch. Called concurrently from a pool of
    /// loader tasks bounded by the free queue's capacity.
    async fn load_batch(&self) -> anyhow::Result<Bytes>;

    /// Total batch count reported to `GET /num_batches`; stable once
    /// `/data_loader` setup has completed.
    async fn num_batches(&self) -> anyhow::Result<u64>;

    /// Forwarded from `POST /dataset`. Idempotent on repeat. The real
    /// dataset wire format is collaborator-defined; implementations
    /// decide how to turn `blob` into batches.
    async fn set_dataset(&self, blob: &[u8]) -> anyhow::Result<()>;

    /// Forwarded from `POST /data_loader`.
    async fn configure(&self, blob: &[u8]) -> anyhow::Result<()>;
}

/// Reference implementation: cycles through a fixed, pre-seeded set of
/// batches. Used by coordinator integration tests and demo runs.
pub struct InMemoryDataLoader {
    batches: parking_lot::Mutex<Vec<Bytes>>,
    cursor: std::sync::atomic::AtomicUsize,
}

impl InMemoryDataLoader {
    pub fn new(batches: Vec<Bytes>) -> Self {
        Self {
            batches: parking_lot::Mutex::new(batches),
            cursor: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// A loader seeded with `count` batches, each a single byte equal to
    /// its index modulo 256. Enough to distinguish batches in tests
    /// without pulling in a real dataset format.
    pub fn with_synthetic_batches(count: usize) -> Self {
        Self::new(synthetic_batches(count))
    }

    /// An 8-byte payload is read as a big-endian batch count and reseeds
    /// the loader with that many synthetic batches, same shape as
    /// [`InMemoryDataLoader::with_synthetic_batches`]. Any other length
    /// leaves the current batches untouched: the real dataset/loader
    /// wire format is an external-collaborator concern this reference
    /// implementation does not materialize.
    fn maybe_reseed_from_count(&self, blob: &[u8]) -> anyhow::Result<()> {
        if blob.len() == 8 {
            let count = advdist_core::wire::decode_u64(blob)? as usize;
            *self.batches.lock() = synthetic_batches(count);
            self.cursor.store(0, std::sync::atomic::Ordering::SeqCst);
        }
        Ok(())
    }
}

fn synthetic_batches(count: usize) -> Vec<Bytes> {
    (0..count)
        .map(|i| Bytes::from(vec![(i % 256) as u8]))
        .collect()
}

#[async_trait]
impl DataLoader for InMemoryDataLoader {
    async fn load_batch(&self) -> anyhow::Result<Bytes> {
        let batches = self.batches.lock();
        if batches.is_empty() {
            anyhow::bail!("data loader has no batches configured");
        }
        let idx = self
            .cursor
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            % batches.len();
        Ok(batches[idx].clone())
    }

    async fn num_batches(&self) -> anyhow::Result<u64> {
        Ok(self.batches.lock().len() as u64)
    }

    async fn set_dataset(&self, blob: &[u8]) -> anyhow::Result<()> {
        self.maybe_reseed_from_count(blob)
    }

    async fn configure(&self, blob: &[u8]) -> anyhow::Result<()> {
        self.maybe_reseed_from_count(blob)
    }
}
