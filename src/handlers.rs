// HTTP request handlers for the coordinator.
//
// Implements the batch pull/push API and the six setup endpoints.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::{info, warn};

use advdist_core::model::RunParams;
use advdist_core::wire::{
    decode_id_prefixed, decode_parameters, encode_id_prefixed, encode_ids, encode_u64, WireError,
};
use advdist_core::{Batch, SetupEvent};

use crate::{spawn_loader_refill, AppError, AppState};

const OCTET_STREAM: &str = "application/octet-stream";
const EXTRA_HEADER: &str = "X-Extra-Data";

fn octet_response(body: Bytes) -> Response {
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, OCTET_STREAM)],
        body,
    )
        .into_response()
}

fn wire_error_to_response(err: WireError) -> AppError {
    AppError::with_status(StatusCode::BAD_REQUEST, err.into())
}

// ---- setup endpoints (never wait on the barrier) -------------------

pub async fn post_parameters(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, AppError> {
    let params: RunParams = decode_parameters(&body).map_err(wire_error_to_response)?;
    state.engine.reconfigure(params);
    state.engine.barrier().fire(SetupEvent::Parameters);
    info!(
        max_patience = params.max_patience,
        queue_limit = params.queue_limit,
        "parameters set"
    );
    Ok(StatusCode::OK.into_response())
}

pub async fn post_dataset(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, AppError> {
    state.data_loader.set_dataset(&body).await?;
    state.engine.barrier().fire(SetupEvent::Dataset);
    info!(bytes = body.len(), "dataset set");
    Ok(StatusCode::OK.into_response())
}

pub async fn post_data_loader(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, AppError> {
    state.data_loader.configure(&body).await?;
    state.engine.barrier().fire(SetupEvent::DataLoader);

    let queue_limit = state.engine.params().queue_limit;
    info!(queue_limit, "data loader configured, priming free queue");
    for _ in 0..queue_limit {
        spawn_loader_refill(state.clone());
    }

    Ok(StatusCode::OK.into_response())
}

pub async fn post_model(State(state): State<AppState>, body: Bytes) -> Result<Response, AppError> {
    let version = state.engine.set_model(body.clone());
    state.engine.barrier().fire(SetupEvent::Model);
    counter!("advdist.model.updates", 1);
    info!(model_id = version, bytes = body.len(), "model set");
    Ok(StatusCode::OK.into_response())
}

pub async fn post_model_state(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, AppError> {
    let (version, swept) = state.engine.set_model_state(body.clone()).await;
    state.engine.barrier().fire(SetupEvent::ModelState);
    counter!("advdist.model_state.updates", 1);
    if swept > 0 {
        counter!("advdist.staleness.reclaimed", swept as u64);
    }
    info!(
        model_state_id = version,
        bytes = body.len(),
        swept,
        "model state set"
    );
    Ok(StatusCode::OK.into_response())
}

pub async fn post_attack(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, AppError> {
    let version = state.engine.set_attack(body.clone());
    state.engine.barrier().fire(SetupEvent::Attack);
    counter!("advdist.attack.updates", 1);
    info!(attack_id = version, bytes = body.len(), "attack set");
    Ok(StatusCode::OK.into_response())
}

pub async fn post_reset(State(state): State<AppState>) -> Result<Response, AppError> {
    state.engine.reset();
    warn!("coordinator reset: barrier re-armed, queues drained, versions zeroed");
    Ok(StatusCode::OK.into_response())
}

// ---- data-plane endpoints (wait on the barrier) ---------------------

pub async fn get_model(State(state): State<AppState>) -> Result<Response, AppError> {
    state.engine.barrier().wait().await;
    let (data, _version) = state.engine.model();
    Ok(octet_response(data))
}

pub async fn get_model_state(State(state): State<AppState>) -> Result<Response, AppError> {
    state.engine.barrier().wait().await;
    let (data, _version) = state.engine.model_state();
    Ok(octet_response(data))
}

pub async fn get_attack(State(state): State<AppState>) -> Result<Response, AppError> {
    state.engine.barrier().wait().await;
    let (data, _version) = state.engine.attack();
    Ok(octet_response(data))
}

pub async fn get_ids(State(state): State<AppState>) -> Result<Response, AppError> {
    state.engine.barrier().wait().await;
    let versions = state.engine.versions();
    Ok(octet_response(encode_ids(versions)))
}

pub async fn get_num_batches(State(state): State<AppState>) -> Result<Response, AppError> {
    state.engine.barrier().wait().await;
    let count = state.data_loader.num_batches().await?;
    Ok(octet_response(encode_u64(count)))
}

pub async fn get_clean_batch(State(state): State<AppState>) -> Result<Response, AppError> {
    state.engine.barrier().wait().await;
    let Some(batch) = state.engine.dispatch_clean_batch().await else {
        return Err(AppError::with_status(
            StatusCode::INTERNAL_SERVER_ERROR,
            anyhow::anyhow!("free queue closed unexpectedly"),
        ));
    };
    counter!("advdist.clean_batch.served", 1);

    // Exactly one loader call is launched per serve to keep the free
    // queue saturated.
    spawn_loader_refill(state.clone());

    let clean = batch.clean.unwrap_or_default();
    Ok(octet_response(encode_id_prefixed(batch.id, &clean)))
}

pub async fn post_adv_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    state.engine.barrier().wait().await;
    let (id, adv) = decode_id_prefixed(&body).map_err(wire_error_to_response)?;
    let extra = headers
        .get(EXTRA_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let accepted = state.engine.complete_batch(id, adv, extra).await;
    if accepted {
        counter!("advdist.adv_batch.accepted", 1);
    } else {
        // Unknown id: already swept, or a duplicate post racing the
        // sweep. Silently dropped rather than treated as an error.
        counter!("advdist.adv_batch.dropped", 1);
    }
    Ok(StatusCode::OK.into_response())
}

pub async fn get_adv_batch(State(state): State<AppState>) -> Result<Response, AppError> {
    state.engine.barrier().wait().await;
    let Some(batch) = state.engine.done().pop().await else {
        return Err(AppError::with_status(
            StatusCode::INTERNAL_SERVER_ERROR,
            anyhow::anyhow!("done queue closed unexpectedly"),
        ));
    };
    let adv = batch.adv.unwrap_or_default();

    let mut response = octet_response(adv);
    if let Some(extra) = batch.extra {
        if let Ok(value) = HeaderValue::from_str(&extra) {
            response.headers_mut().insert(EXTRA_HEADER, value);
        }
    }
    Ok(response)
}

pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// A loader task: allocate the next id, ask the data-loader for a clean
/// payload, and push the resulting batch onto free. Blocks on the free
/// queue's bounded `send` when full, which is the natural backpressure
/// from worker consumption onto the data-loader.
pub(crate) async fn run_loader_refill(state: AppState) {
    let id = state.engine.next_batch_id();
    match state.data_loader.load_batch().await {
        Ok(clean) => {
            let batch = Batch::new_clean(id, clean);
            let _ = state.engine.free().push(batch).await;
        }
        Err(err) => {
            // Upstream data-loader error: logged rather than fatal, so
            // the coordinator stays live for other requests.
            tracing::error!(error = %err, batch_id = id, "data loader failed to produce a batch");
        }
    }
}
