//! Cached copy of the three coordinator counters, held by the worker
//! between version polls.

use parking_lot::RwLock;

use advdist_core::model::Versions;

/// Guards the worker's local view of `(attackID, modelID, modelStateID)`.
/// Read by the perturb-and-advance task (for the `extra` header tag),
/// written by the version-poll task once a new blob has been pushed
/// into the perturber.
pub struct CachedVersions {
    inner: RwLock<Versions>,
}

impl CachedVersions {
    pub fn new(initial: Versions) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    pub fn get(&self) -> Versions {
        *self.inner.read()
    }

    pub fn set(&self, versions: Versions) {
        *self.inner.write() = versions;
    }
}
