//! Coordinator library: holds the model/attack/dataset state and the
//! free/inFlight/done batch queues behind an HTTP API, and drives a
//! background staleness sweep via `/model_state` updates.

mod handlers;
mod init;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use advdist_contracts::{DataLoader, InMemoryDataLoader};
use advdist_core::Engine;

pub use init::{init_tracing, LogFormat};

/// Shared application state handed to every handler via axum's `State`
/// extractor. Cheap to clone: both fields are already behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub data_loader: Arc<dyn DataLoader>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            engine: Arc::new(Engine::default()),
            data_loader: Arc::new(InMemoryDataLoader::with_synthetic_batches(0)),
        }
    }

    /// Seeded with `count` synthetic batches up front, for `--demo` runs
    /// that want a working pull/push loop without a trainer POSTing a
    /// real dataset first.
    pub fn with_demo_batches(count: usize) -> Self {
        Self {
            engine: Arc::new(Engine::default()),
            data_loader: Arc::new(InMemoryDataLoader::with_synthetic_batches(count)),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Uniform error type for handlers: an `anyhow::Error` plus the status
/// code it should surface as.
pub struct AppError {
    status: StatusCode,
    source: anyhow::Error,
}

impl AppError {
    pub fn with_status(status: StatusCode, source: anyhow::Error) -> Self {
        Self { status, source }
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AppError({}, {:?})", self.status, self.source)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(status = %self.status, error = %self.source, "request failed");
        (
            self.status,
            axum::Json(serde_json::json!({ "error": self.source.to_string() })),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            source: err.into(),
        }
    }
}

/// Fire-and-forget one loader call. Used both to prime the free queue
/// after `/data_loader` and to replace a batch just served by
/// `/clean_batch`.
pub(crate) fn spawn_loader_refill(state: AppState) {
    tokio::spawn(handlers::run_loader_refill(state));
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/parameters", post(handlers::post_parameters))
        .route("/dataset", post(handlers::post_dataset))
        .route("/data_loader", post(handlers::post_data_loader))
        .route("/model", get(handlers::get_model).post(handlers::post_model))
        .route(
            "/model_state",
            get(handlers::get_model_state).post(handlers::post_model_state),
        )
        .route("/attack", get(handlers::get_attack).post(handlers::post_attack))
        .route("/ids", get(handlers::get_ids))
        .route("/num_batches", get(handlers::get_num_batches))
        .route("/clean_batch", get(handlers::get_clean_batch))
        .route(
            "/adv_batch",
            get(handlers::get_adv_batch).post(handlers::post_adv_batch),
        )
        .route("/reset", post(handlers::post_reset))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Grace period between a shutdown signal and a forced exit.
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

/// Bind `address` and serve until SIGINT/SIGTERM, then wait up to
/// [`SHUTDOWN_GRACE`] for in-flight requests to drain before forcing
/// the process to exit. `demo_batches` seeds the built-in in-memory
/// data loader with that many synthetic batches instead of the empty
/// default, so the coordinator can serve a pull/push loop without a
/// trainer posting `/dataset`/`/data_loader` first.
pub async fn run(address: &str, demo_batches: Option<usize>) -> anyhow::Result<()> {
    let state = match demo_batches {
        Some(count) => AppState::with_demo_batches(count),
        None => AppState::new(),
    };
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    tracing::info!(%address, "coordinator listening");

    let (notify_tx, notify_rx) = tokio::sync::oneshot::channel::<()>();
    let serve = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = notify_rx.await;
    });
    tokio::pin!(serve);

    tokio::select! {
        result = &mut serve => return Ok(result?),
        _ = shutdown_signal() => {
            let _ = notify_tx.send(());
        }
    }

    if tokio::time::timeout(SHUTDOWN_GRACE, serve).await.is_err() {
        tracing::error!(
            grace_seconds = SHUTDOWN_GRACE.as_secs(),
            "graceful shutdown exceeded grace period, forcing exit"
        );
        std::process::exit(1);
    }

    Ok(())
}

/// Same as [`run`] but serves on a caller-supplied listener and returns
/// as soon as the server stops, without waiting on OS signals. Used by
/// the end-to-end test harness to boot the coordinator on an ephemeral
/// port inside the test process.
pub async fn run_with_listener(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn shutdown_signal() {
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

    tracing::warn!("shutdown signal received, draining in-flight requests");
}
