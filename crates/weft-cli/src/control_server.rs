//! The optional local HTTP control surface (§4.9, §6): a thin transport
//! over the Control Bus's producer-side events plus a read-only snapshot
//! of the Worker Pool. It carries no orchestration logic of its own --
//! every POST here is exactly one `ControlBus` call the scheduler would
//! otherwise receive from a `weft intervene`/`stop`/`set-max-parallel`
//! invocation running in-process.

use std::net::SocketAddr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::info;
use weft_core::{ControlBus, WorkerPool};

#[derive(Clone)]
struct AppState {
    bus: ControlBus,
    pool: WorkerPool,
}

#[derive(Debug, Deserialize)]
struct InterveneRequest {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ConfigUpdateRequest {
    max_parallel: u32,
}

#[derive(Debug, Serialize)]
struct Ack {
    ok: bool,
}

fn router(bus: ControlBus, pool: WorkerPool) -> Router {
    Router::new()
        .route("/intervene", post(intervene))
        .route("/stop", post(stop))
        .route("/config", post(config_update))
        .route("/snapshot", get(snapshot))
        .layer(CorsLayer::permissive())
        .with_state(AppState { bus, pool })
}

async fn intervene(State(state): State<AppState>, Json(body): Json<InterveneRequest>) -> impl IntoResponse {
    state.bus.intervene(body.text);
    Json(Ack { ok: true })
}

async fn stop(State(state): State<AppState>) -> impl IntoResponse {
    state.bus.stop();
    Json(Ack { ok: true })
}

async fn config_update(State(state): State<AppState>, Json(body): Json<ConfigUpdateRequest>) -> impl IntoResponse {
    if body.max_parallel == 0 {
        return (StatusCode::BAD_REQUEST, Json(Ack { ok: false })).into_response();
    }
    state.bus.config_update(body.max_parallel);
    (StatusCode::OK, Json(Ack { ok: true })).into_response()
}

async fn snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.pool.snapshot().await)
}

/// Serves the control surface on `bind_addr` until the task running this
/// future is aborted. Intended to run alongside
/// [`crate::commands::start_cmd::run`] as a background task for the
/// lifetime of one `weft start` invocation -- the caller holds the
/// `JoinHandle` and aborts it once the scheduler itself returns.
pub async fn serve(bind_addr: &str, bus: ControlBus, pool: WorkerPool) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr.parse()?;
    let app = router(bus, pool);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "control surface listening");
    axum::serve(listener, app).await?;
    Ok(())
}
