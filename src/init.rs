// Logging setup for the coordinator: re-exports the shared helper from
// `advdist-core` so the coordinator and worker binaries configure
// `tracing` identically.

pub use advdist_core::logging::{init_tracing, LogFormat};
