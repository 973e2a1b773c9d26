//! Worker library: the coordinator HTTP client, the cached version
//! counters, the pure version-poll ordering decision, and the
//! startup/steady-state loop. `main.rs` wires a CLI onto [`run`].

mod client;
mod poll;
mod run;
mod versions;

pub use client::CoordinatorClient;
pub use poll::{plan_updates, UpdateKind};
pub use run::run;
pub use versions::CachedVersions;
