//! Shared `tracing` setup for both binaries in this workspace: an
//! `EnvFilter` seeded from a CLI flag (falling back to the `RUST_LOG`
//! convention `EnvFilter` already understands), registered against
//! either a human-readable or JSON fmt layer.

use clap::ValueEnum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

pub fn init_tracing(log_level: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Idempotent: integration tests that boot a coordinator or worker
    // in-process may call this more than once within a test binary.
    let _ = match format {
        LogFormat::Json => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
        }
        LogFormat::Text => tracing::subscriber::set_global_default(registry.with(fmt::layer())),
    };
}
