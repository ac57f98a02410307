use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::actor_id;
use crate::engine::lifecycle::{
    AcceptDonation, CreateRequest, ReceiptConfirmation, RequestLifecycle, StatusUpdate,
};
use crate::error::AppError;
use crate::models::participant::Role;
use crate::models::request::{FoodRequest, RequestStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/requests", post(create_request).get(list_requests))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/accept", post(accept_request))
        .route("/requests/:id/status", post(update_status))
        .route("/requests/:id/confirm", post(confirm_receipt))
        .route("/requests/:id/cancel", post(cancel_request))
        .route("/analytics", get(analytics))
}

#[derive(Deserialize)]
pub struct ListFilter {
    pub status: Option<RequestStatus>,
}

async fn create_request(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateRequest>,
) -> Result<Json<FoodRequest>, AppError> {
    let actor = actor_id(&headers)?;
    let request = RequestLifecycle::new(state).create(actor, payload)?;
    Ok(Json(request))
}

/// Donor browsing order: most urgent first.
async fn list_requests(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ListFilter>,
) -> Json<Vec<FoodRequest>> {
    let mut requests: Vec<FoodRequest> = state
        .requests
        .iter()
        .filter(|entry| filter.status.is_none_or(|s| entry.value().status == s))
        .map(|entry| entry.value().clone())
        .collect();

    requests.sort_by(|a, b| {
        b.urgency_score
            .total_cmp(&a.urgency_score)
            .then(a.created_at.cmp(&b.created_at))
    });

    Json(requests)
}

async fn get_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<FoodRequest>, AppError> {
    let request = state
        .requests
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("request {id} not found")))?;

    Ok(Json(request.clone()))
}

async fn accept_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<AcceptDonation>,
) -> Result<Json<FoodRequest>, AppError> {
    let actor = actor_id(&headers)?;
    let request = RequestLifecycle::new(state).donor_accept(actor, id, payload)?;
    Ok(Json(request))
}

async fn update_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<StatusUpdate>,
) -> Result<Json<FoodRequest>, AppError> {
    let actor = actor_id(&headers)?;
    let request = RequestLifecycle::new(state).volunteer_update(actor, id, payload)?;
    Ok(Json(request))
}

async fn confirm_receipt(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<ReceiptConfirmation>,
) -> Result<Json<FoodRequest>, AppError> {
    let actor = actor_id(&headers)?;
    let request = RequestLifecycle::new(state).confirm_receipt(actor, id, payload)?;
    Ok(Json(request))
}

async fn cancel_request(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<FoodRequest>, AppError> {
    let actor = actor_id(&headers)?;
    let request = RequestLifecycle::new(state).cancel(actor, id)?;
    Ok(Json(request))
}

#[derive(Serialize)]
struct AnalyticsResponse {
    total_requests: usize,
    completed_requests: usize,
    total_people_fed: u64,
    requester_count: usize,
    donor_count: usize,
    volunteer_count: usize,
    success_rate: f64,
    status_distribution: HashMap<&'static str, usize>,
}

async fn analytics(State(state): State<Arc<AppState>>) -> Json<AnalyticsResponse> {
    let mut status_distribution: HashMap<&'static str, usize> = HashMap::new();
    let mut completed_requests = 0;
    let mut total_people_fed: u64 = 0;

    for entry in state.requests.iter() {
        let request = entry.value();
        *status_distribution.entry(request.status.as_str()).or_default() += 1;
        if request.status == RequestStatus::Completed {
            completed_requests += 1;
            total_people_fed += u64::from(request.people_count);
        }
    }

    let total_requests = state.requests.len();
    let success_rate = if total_requests > 0 {
        let rate = completed_requests as f64 / total_requests as f64 * 100.0;
        (rate * 100.0).round() / 100.0
    } else {
        0.0
    };

    let count_role = |role: Role| {
        state
            .participants
            .iter()
            .filter(|entry| entry.value().role == role)
            .count()
    };

    Json(AnalyticsResponse {
        total_requests,
        completed_requests,
        total_people_fed,
        requester_count: count_role(Role::Requester),
        donor_count: count_role(Role::Donor),
        volunteer_count: count_role(Role::Volunteer),
        success_rate,
        status_distribution,
    })
}
