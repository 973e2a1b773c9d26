//! Startup phase, steady-state loop, and two-stage interrupt handling.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use advdist_contracts::Perturber;

use crate::client::CoordinatorClient;
use crate::poll::{plan_updates, UpdateKind};
use crate::versions::CachedVersions;

/// Runs the worker to completion: startup, then the steady-state loop
/// until an interrupt is observed. Any transport or perturber error is
/// propagated to the caller, which treats it as fatal for the process.
pub async fn run(
    client: CoordinatorClient,
    perturber: Box<dyn Perturber>,
    device: &str,
    buffer: usize,
) -> anyhow::Result<()> {
    let perturber = Arc::new(Mutex::new(perturber));
    let interrupt = spawn_signal_watcher();

    let (versions, tx, rx) = startup(&client, &perturber, device, buffer).await?;
    tracing::info!("startup complete, entering steady state");

    steady_state(client, perturber, Arc::new(versions), rx, tx, interrupt).await
}

async fn startup(
    client: &CoordinatorClient,
    perturber: &Mutex<Box<dyn Perturber>>,
    device: &str,
    buffer: usize,
) -> anyhow::Result<(
    CachedVersions,
    mpsc::Sender<(u64, Bytes)>,
    mpsc::Receiver<(u64, Bytes)>,
)> {
    let capacity = buffer.max(1);
    let (tx, rx) = mpsc::channel(capacity);

    let advertise = async { perturber.lock().set_device(device) };

    let fetch_ids = client.get_ids();

    let fetch_blobs = async {
        let model_state = client.get_model_state().await?;
        let attack = client.get_attack().await?;
        let model = client.get_model().await?;
        let mut p = perturber.lock();
        p.update_model_state(&model_state)?;
        p.update_attack(&attack)?;
        p.update_model(&model)?;
        Ok::<(), anyhow::Error>(())
    };

    let prefetch = async {
        let mut handles = Vec::with_capacity(capacity);
        for _ in 0..capacity {
            let client = client.clone();
            let tx = tx.clone();
            handles.push(tokio::spawn(async move { fetch_and_enqueue(&client, &tx).await }));
        }
        for handle in handles {
            handle.await.context("prefetch task panicked")??;
        }
        Ok::<(), anyhow::Error>(())
    };

    let (advertise_res, ids_res, blobs_res, prefetch_res) =
        tokio::join!(advertise, fetch_ids, fetch_blobs, prefetch);

    advertise_res.context("set_device failed")?;
    let ids = ids_res.context("GET /ids failed during startup")?;
    blobs_res?;
    prefetch_res?;

    Ok((CachedVersions::new(ids), tx, rx))
}

async fn fetch_and_enqueue(
    client: &CoordinatorClient,
    tx: &mpsc::Sender<(u64, Bytes)>,
) -> anyhow::Result<()> {
    let (id, clean) = client.get_clean_batch().await?;
    tx.send((id, clean))
        .await
        .map_err(|_| anyhow::anyhow!("prefetch channel closed"))
}

async fn steady_state(
    client: CoordinatorClient,
    perturber: Arc<Mutex<Box<dyn Perturber>>>,
    versions: Arc<CachedVersions>,
    mut rx: mpsc::Receiver<(u64, Bytes)>,
    tx: mpsc::Sender<(u64, Bytes)>,
    interrupt: Arc<AtomicU8>,
) -> anyhow::Result<()> {
    loop {
        if interrupt.load(Ordering::SeqCst) >= 1 {
            tracing::info!("interrupt observed at loop head, exiting");
            return Ok(());
        }

        let perturb_and_advance = perturb_and_advance(&client, &perturber, &versions, &mut rx, &tx);
        let version_poll = version_poll(&client, &perturber, &versions);

        let (perturb_res, poll_res) = tokio::join!(perturb_and_advance, version_poll);
        perturb_res?;
        poll_res?;
    }
}

async fn perturb_and_advance(
    client: &CoordinatorClient,
    perturber: &Mutex<Box<dyn Perturber>>,
    versions: &CachedVersions,
    rx: &mut mpsc::Receiver<(u64, Bytes)>,
    tx: &mpsc::Sender<(u64, Bytes)>,
) -> anyhow::Result<()> {
    let (id, clean) = rx
        .recv()
        .await
        .ok_or_else(|| anyhow::anyhow!("prefetch channel closed"))?;

    let tag = versions.get().model_state_id.to_string();
    let adv = perturber.lock().perturb(&clean)?;
    client.post_adv_batch(id, &adv, &tag).await?;

    fetch_and_enqueue(client, tx).await
}

async fn version_poll(
    client: &CoordinatorClient,
    perturber: &Mutex<Box<dyn Perturber>>,
    versions: &CachedVersions,
) -> anyhow::Result<()> {
    let old = versions.get();
    let new = client.get_ids().await?;

    for update in plan_updates(old, new) {
        match update {
            UpdateKind::ModelState => {
                let blob = client.get_model_state().await?;
                perturber.lock().update_model_state(&blob)?;
            }
            UpdateKind::Attack => {
                let blob = client.get_attack().await?;
                perturber.lock().update_attack(&blob)?;
            }
            UpdateKind::Model => {
                let blob = client.get_model().await?;
                perturber.lock().update_model(&blob)?;
            }
        }
    }

    versions.set(new);
    Ok(())
}

/// Watches for OS interrupts in the background. The first signal bumps
/// the flag the steady-state loop checks at its head; the second exits
/// the process immediately.
fn spawn_signal_watcher() -> Arc<AtomicU8> {
    let flag = Arc::new(AtomicU8::new(0));
    let watcher_flag = flag.clone();
    tokio::spawn(async move {
        loop {
            wait_for_signal().await;
            let previous = watcher_flag.fetch_add(1, Ordering::SeqCst);
            if previous == 0 {
                tracing::warn!("interrupt received, finishing current iteration then exiting");
            } else {
                tracing::warn!("second interrupt received, exiting immediately");
                std::process::exit(130);
            }
        }
    });
    flag
}

async fn wait_for_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
