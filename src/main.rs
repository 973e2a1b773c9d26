use anyhow::{Context, Result};
use clap::Parser;

/// Coordinator for distributed adversarial example generation.
#[derive(Parser)]
#[command(name = "advdist-coordinator")]
#[command(version)]
#[command(about = "Holds the model/attack/dataset and the free/inFlight/done batch queues", long_about = None)]
struct Cli {
    /// Listen address
    #[arg(short = 'A', long, default_value = "0.0.0.0:8080")]
    address: String,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: advdist_coordinator::LogFormat,

    /// Seed the built-in data loader with N synthetic batches at
    /// startup, so the coordinator serves a working pull/push loop
    /// without a trainer posting a real dataset first.
    #[arg(long, value_name = "COUNT")]
    demo: Option<usize>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    advdist_coordinator::init_tracing(&cli.log_level, cli.log_format);

    advdist_coordinator::run(&cli.address, cli.demo).await
}
