use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::rest::load_actor;
use crate::error::AppError;
use crate::geo;
use crate::models::participant::{
    GeoPoint, Participant, Role, TransportMode, VerificationStatus,
};
use crate::notify::email;
use crate::notify::events::{emit, DomainEvent};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/participants", post(register))
        .route("/participants/:id", get(get_participant))
        .route("/participants/:id/verify", post(verify_participant))
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub organization: Option<String>,
    pub location: String,
    pub coordinates: Option<GeoPoint>,
    pub transport_mode: Option<String>,
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub action: VerificationStatus,
    pub notes: Option<String>,
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<Participant>, AppError> {
    if payload.name.trim().is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }
    if !payload.email.contains('@') {
        return Err(AppError::BadRequest("invalid email address".to_string()));
    }
    if payload.location.trim().len() < 3 {
        return Err(AppError::BadRequest(
            "location must be at least 3 characters".to_string(),
        ));
    }
    if let Some(point) = &payload.coordinates {
        geo::validate(point)?;
    }

    let transport_mode = match payload.role {
        Role::Volunteer => payload
            .transport_mode
            .as_deref()
            .map(TransportMode::parse),
        _ => None,
    };
    let verification = match payload.role {
        Role::Requester => Some(VerificationStatus::Pending),
        _ => None,
    };

    let participant = Participant {
        id: Uuid::new_v4(),
        name: payload.name,
        email: payload.email,
        role: payload.role,
        organization: payload.organization,
        location: payload.location.trim().to_string(),
        coordinates: payload.coordinates,
        transport_mode,
        verification,
        verification_notes: None,
        reliability_score: 5.0,
        total_requests: 0,
        completed_requests: 0,
        total_donations: 0,
        completed_tasks: 0,
        created_at: Utc::now(),
    };

    state
        .participants
        .insert(participant.id, participant.clone());
    email::send_welcome(state.mailer.as_ref(), &participant);

    Ok(Json(participant))
}

async fn get_participant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Participant>, AppError> {
    let participant = state
        .participants
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("participant {id} not found")))?;

    Ok(Json(participant.clone()))
}

async fn verify_participant(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<Participant>, AppError> {
    let actor = load_actor(&state, &headers)?;
    if actor.role != Role::Coordinator {
        return Err(AppError::Forbidden(
            "only coordinators can verify requesters".to_string(),
        ));
    }
    if payload.action == VerificationStatus::Pending {
        return Err(AppError::BadRequest(
            "action must be verified or rejected".to_string(),
        ));
    }

    let updated = {
        let mut target = state
            .participants
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("participant {id} not found")))?;

        if target.role != Role::Requester {
            return Err(AppError::BadRequest(
                "only requesters carry a verification status".to_string(),
            ));
        }

        target.verification = Some(payload.action);
        target.verification_notes = payload.notes;
        target.clone()
    };

    if payload.action == VerificationStatus::Verified {
        email::send_verification_approved(state.mailer.as_ref(), &updated);
    }
    emit(
        &state.events_tx,
        DomainEvent::VerificationUpdated {
            participant_id: updated.id,
            status: payload.action,
        },
    );

    Ok(Json(updated))
}
