//! The free / done bounded FIFOs.
//!
//! Both are backed by a `tokio::sync::mpsc` channel sized to `queueLimit`.
//! A full channel makes `send` suspend, which is the natural backpressure
//! point between producers and consumers. Capacity changes
//! (`POST /parameters`, `POST /reset`) swap in a fresh channel pair;
//! senders holding a clone of a since-replaced `Sender` simply fail their
//! next send, which is acceptable because a reset is defined to drain and
//! reinitialize the run.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::model::Batch;

struct ChannelPair {
    tx: mpsc::Sender<Batch>,
    rx: Arc<AsyncMutex<mpsc::Receiver<Batch>>>,
}

fn make_pair(capacity: usize) -> ChannelPair {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    ChannelPair {
        tx,
        rx: Arc::new(AsyncMutex::new(rx)),
    }
}

/// A bounded FIFO of batches, recreated whenever its capacity changes.
pub struct BoundedQueue {
    pair: parking_lot::RwLock<ChannelPair>,
}

impl BoundedQueue {
    pub fn new(capacity: u64) -> Self {
        Self {
            pair: parking_lot::RwLock::new(make_pair(capacity as usize)),
        }
    }

    /// Push a batch, suspending if the queue is at capacity.
    ///
    /// Returns `Err` if the queue was reconfigured out from under this
    /// send (the old channel's receiver was dropped); callers should
    /// treat this the same as a cancelled operation.
    pub async fn push(&self, batch: Batch) -> Result<(), Batch> {
        let tx = self.pair.read().tx.clone();
        tx.send(batch).await.map_err(|e| e.0)
    }

    /// Try to push without suspending, failing immediately if the queue
    /// is at capacity.
    pub fn try_push(&self, batch: Batch) -> Result<(), Batch> {
        let tx = self.pair.read().tx.clone();
        tx.try_send(batch).map_err(|e| match e {
            mpsc::error::TrySendError::Full(b) => b,
            mpsc::error::TrySendError::Closed(b) => b,
        })
    }

    /// Pop the next batch, suspending while empty. Consumers serialize on
    /// an internal async mutex so FIFO order is preserved under
    /// concurrent pullers.
    pub async fn pop(&self) -> Option<Batch> {
        let rx = self.pair.read().rx.clone();
        let mut guard = rx.lock().await;
        guard.recv().await
    }

    /// Number of batches currently buffered (best-effort, used for
    /// diagnostics/metrics only).
    pub fn len(&self) -> usize {
        let pair = self.pair.read();
        pair.tx.max_capacity() - pair.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recreate the queue with a new capacity, discarding whatever was
    /// buffered (the drain `/reset` and `/parameters` both require).
    pub fn reset(&self, capacity: u64) {
        let mut pair = self.pair.write();
        *pair = make_pair(capacity as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn batch(id: u64) -> Batch {
        Batch::new_clean(id, Bytes::from_static(b"x"))
    }

    #[tokio::test]
    async fn fifo_order_preserved() {
        let q = BoundedQueue::new(4);
        q.push(batch(1)).await.unwrap();
        q.push(batch(2)).await.unwrap();
        q.push(batch(3)).await.unwrap();
        assert_eq!(q.pop().await.unwrap().id, 1);
        assert_eq!(q.pop().await.unwrap().id, 2);
        assert_eq!(q.pop().await.unwrap().id, 3);
    }

    #[tokio::test]
    async fn push_blocks_when_full() {
        let q = Arc::new(BoundedQueue::new(1));
        q.push(batch(1)).await.unwrap();
        assert!(q.try_push(batch(2)).is_err());

        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.push(batch(2)).await });

        // Give the blocked push a moment to park, then drain one slot.
        tokio::task::yield_now().await;
        assert_eq!(q.pop().await.unwrap().id, 1);
        handle.await.unwrap().unwrap();
        assert_eq!(q.pop().await.unwrap().id, 2);
    }

    #[tokio::test]
    async fn reset_drains_and_recreates() {
        let q = BoundedQueue::new(2);
        q.push(batch(1)).await.unwrap();
        q.reset(3);
        // Old content is gone; new capacity is in effect.
        q.push(batch(2)).await.unwrap();
        q.push(batch(3)).await.unwrap();
        q.push(batch(4)).await.unwrap();
        assert_eq!(q.pop().await.unwrap().id, 2);
    }
}
