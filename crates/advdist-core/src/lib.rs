//! Domain logic for distributed adversarial example generation: the
//! batch lifecycle, the staleness sweep, the setup barrier, and the wire
//! framing shared by the coordinator and the worker. No HTTP, no CLI.
//! Those live in `advdist-coordinator` (the workspace root package) and
//! `advdist-worker`.

pub mod barrier;
pub mod engine;
pub mod in_flight;
pub mod logging;
pub mod model;
pub mod queues;
pub mod wire;

pub use barrier::{SetupBarrier, SetupEvent};
pub use engine::Engine;
pub use in_flight::InFlight;
pub use logging::{init_tracing, LogFormat};
pub use model::{Batch, BatchEnvelope, RunParams, Versions};
pub use queues::BoundedQueue;
