use anyhow::{Context, Result};
use clap::Parser;

use advdist_contracts::NullPerturber;
use advdist_core::LogFormat;

/// Worker for distributed adversarial example generation: pulls clean
/// batches, perturbs them, and pushes adversarial batches back.
#[derive(Parser)]
#[command(name = "advdist-worker")]
#[command(version)]
#[command(about = "Pulls clean batches from the coordinator, perturbs them, and pushes results back", long_about = None)]
struct Cli {
    /// Coordinator base URL
    #[arg(short = 'H', long, default_value = "http://127.0.0.1:8080")]
    host: String,

    /// Computation device tag passed to the perturber
    #[arg(short = 'D', long, default_value = "cpu")]
    device: String,

    /// Local prefetch buffer size
    #[arg(short = 'B', long, default_value_t = 2)]
    buffer: usize,

    /// Log level: trace, debug, info, warn, error
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: LogFormat,
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
    advdist_core::init_tracing(&cli.log_level, cli.log_format);

    let client = advdist_worker::CoordinatorClient::new(&cli.host)
        .context("failed to build coordinator HTTP client")?;

    // The real perturber is an opaque, externally-supplied collaborator;
    // this binary ships with the bundled reference implementation so the
    // pull/push loop is runnable out of the box.
    let perturber: Box<dyn advdist_contracts::Perturber> = Box::new(NullPerturber::default());

    if let Err(err) = advdist_worker::run(client, perturber, &cli.device, cli.buffer).await {
        tracing::error!(error = %err, "worker exiting after fatal transport or perturber error");
        std::process::exit(1);
    }

    Ok(())
}
