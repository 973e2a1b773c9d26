//! The setup barrier: six independent one-shot latches plus a wait-group.
//! Data-plane endpoints wait on it; setup POSTs and `/reset` do not.

use std::sync::atomic::{AtomicU8, Ordering};

use tokio::sync::Notify;

/// The six independent setup events that must each fire once before the
/// barrier opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupEvent {
    Attack,
    Model,
    ModelState,
    Dataset,
    DataLoader,
    Parameters,
}

impl SetupEvent {
    fn bit(self) -> u8 {
        match self {
            SetupEvent::Attack => 1 << 0,
            SetupEvent::Model => 1 << 1,
            SetupEvent::ModelState => 1 << 2,
            SetupEvent::Dataset => 1 << 3,
            SetupEvent::DataLoader => 1 << 4,
            SetupEvent::Parameters => 1 << 5,
        }
    }
}

const ALL_FIRED: u8 = 0b0011_1111;

pub struct SetupBarrier {
    fired: AtomicU8,
    notify: Notify,
}

impl Default for SetupBarrier {
    fn default() -> Self {
        Self {
            fired: AtomicU8::new(0),
            notify: Notify::new(),
        }
    }
}

impl SetupBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an event as satisfied. Idempotent: firing an already-fired
    /// event is a no-op (subsequent POSTs to the same setup endpoint are
    /// treated as updates, not barrier re-arms).
    pub fn fire(&self, event: SetupEvent) {
        let previous = self.fired.fetch_or(event.bit(), Ordering::SeqCst);
        if previous & event.bit() == 0 {
            self.notify.notify_waiters();
        }
    }

    pub fn is_open(&self) -> bool {
        self.fired.load(Ordering::SeqCst) == ALL_FIRED
    }

    /// Resolves once all six events have fired. Cheap to call repeatedly;
    /// already-open barriers return immediately.
    pub async fn wait(&self) {
        loop {
            if self.is_open() {
                return;
            }
            let notified = self.notify.notified();
            // Re-check after subscribing to avoid a missed-wakeup race
            // between the is_open check above and notify registration.
            if self.is_open() {
                return;
            }
            notified.await;
        }
    }

    /// Re-arm the barrier (`POST /reset`).
    pub fn reset(&self) {
        self.fired.store(0, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn opens_only_after_all_six_events() {
        let barrier = Arc::new(SetupBarrier::new());
        let waiter = {
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
            })
        };

        for event in [
            SetupEvent::Attack,
            SetupEvent::Model,
            SetupEvent::ModelState,
            SetupEvent::Dataset,
            SetupEvent::DataLoader,
        ] {
            barrier.fire(event);
            tokio::time::sleep(Duration::from_millis(5)).await;
            assert!(!waiter.is_finished());
        }

        barrier.fire(SetupEvent::Parameters);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("barrier should open")
            .unwrap();
    }

    #[test]
    fn firing_twice_is_idempotent() {
        let barrier = SetupBarrier::new();
        barrier.fire(SetupEvent::Attack);
        barrier.fire(SetupEvent::Attack);
        assert!(!barrier.is_open());
    }

    #[test]
    fn reset_re_arms() {
        let barrier = SetupBarrier::new();
        for event in [
            SetupEvent::Attack,
            SetupEvent::Model,
            SetupEvent::ModelState,
            SetupEvent::Dataset,
            SetupEvent::DataLoader,
            SetupEvent::Parameters,
        ] {
            barrier.fire(event);
        }
        assert!(barrier.is_open());
        barrier.reset();
        assert!(!barrier.is_open());
    }
}
