pub mod participants;
pub mod requests;
pub mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::participant::Participant;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(participants::router())
        .merge(requests::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Identity is supplied by the caller and trusted; token issuance and
/// validation live outside this service.
pub(crate) fn actor_id(headers: &HeaderMap) -> Result<Uuid, AppError> {
    let raw = headers
        .get("x-participant-id")
        .ok_or_else(|| AppError::BadRequest("missing x-participant-id header".to_string()))?
        .to_str()
        .map_err(|_| AppError::BadRequest("invalid x-participant-id header".to_string()))?;

    raw.parse()
        .map_err(|_| AppError::BadRequest(format!("invalid participant id: {raw}")))
}

pub(crate) fn load_actor(state: &AppState, headers: &HeaderMap) -> Result<Participant, AppError> {
    let id = actor_id(headers)?;
    let actor = state
        .participants
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("participant {id} not found")))?;
    Ok(actor.clone())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    participants: usize,
    requests: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        participants: state.participants.len(),
        requests: state.requests.len(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}
