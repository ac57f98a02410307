use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::engine::reliability::{record_requester_completion, record_volunteer_completion};
use crate::engine::urgency::urgency_score;
use crate::engine::{assignment, escalation};
use crate::error::AppError;
use crate::geo;
use crate::models::participant::{GeoPoint, Participant, Role};
use crate::models::request::{FoodRequest, RequestStatus};
use crate::notify::events::{emit, DomainEvent};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub food_type: String,
    pub food_category: String,
    pub quantity: u32,
    pub quantity_unit: String,
    pub required_date: String,
    pub required_time: String,
    pub pickup_location: String,
    pub pickup_coordinates: Option<GeoPoint>,
    pub people_count: u32,
    pub special_instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AcceptDonation {
    pub availability_time: String,
    pub food_condition: String,
}

/// Delivery stages a volunteer may report, in chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStep {
    PickedUp,
    InTransit,
    Delivered,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: DeliveryStep,
    #[serde(default)]
    pub extra_volunteer_required: bool,
    pub extra_volunteer_reason: Option<String>,
    pub delivery_photo: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReceiptConfirmation {
    pub rating: Option<u8>,
    pub feedback: Option<String>,
}

/// The state machine governing a request's transitions. Every action holds
/// the request's entry lock for its whole read-guard-write window, so at
/// most one transition wins per guard window; losers observe the new status
/// and fail with `InvalidTransition`. Participant entries are only locked
/// while a request entry is held, never the other way around.
pub struct RequestLifecycle {
    state: Arc<AppState>,
}

impl RequestLifecycle {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub fn create(&self, actor_id: Uuid, payload: CreateRequest) -> Result<FoodRequest, AppError> {
        let result = self.create_inner(actor_id, payload);
        self.record("create", &result);
        result
    }

    pub fn donor_accept(
        &self,
        actor_id: Uuid,
        request_id: Uuid,
        payload: AcceptDonation,
    ) -> Result<FoodRequest, AppError> {
        let result = self.donor_accept_inner(actor_id, request_id, payload);
        self.record("donor_accept", &result);
        result
    }

    pub fn volunteer_update(
        &self,
        actor_id: Uuid,
        request_id: Uuid,
        payload: StatusUpdate,
    ) -> Result<FoodRequest, AppError> {
        let result = self.volunteer_update_inner(actor_id, request_id, payload);
        self.record("volunteer_update", &result);
        result
    }

    pub fn confirm_receipt(
        &self,
        actor_id: Uuid,
        request_id: Uuid,
        payload: ReceiptConfirmation,
    ) -> Result<FoodRequest, AppError> {
        let result = self.confirm_receipt_inner(actor_id, request_id, payload);
        self.record("confirm_receipt", &result);
        result
    }

    pub fn cancel(&self, actor_id: Uuid, request_id: Uuid) -> Result<FoodRequest, AppError> {
        let result = self.cancel_inner(actor_id, request_id);
        self.record("cancel", &result);
        result
    }

    fn create_inner(
        &self,
        actor_id: Uuid,
        payload: CreateRequest,
    ) -> Result<FoodRequest, AppError> {
        let requester = self.load_actor(actor_id, Role::Requester)?;
        if !requester.is_verified_requester() {
            return Err(AppError::Forbidden(
                "only verified requesters can create food requests".to_string(),
            ));
        }

        if payload.pickup_location.trim().is_empty() {
            return Err(AppError::BadRequest(
                "pickup_location cannot be empty".to_string(),
            ));
        }
        if payload.quantity == 0 {
            return Err(AppError::BadRequest("quantity must be > 0".to_string()));
        }
        if let Some(point) = &payload.pickup_coordinates {
            geo::validate(point)?;
        }

        // Never fails: a malformed deadline degrades to the neutral score.
        let urgency = urgency_score(
            payload.people_count,
            &payload.required_date,
            &payload.required_time,
            Some(requester.reliability_score),
        );

        let request = FoodRequest {
            id: Uuid::new_v4(),
            requester_id: requester.id,
            requester_name: requester.name.clone(),
            requester_organization: requester.organization.clone().unwrap_or_default(),
            food_type: payload.food_type,
            food_category: payload.food_category,
            quantity: payload.quantity,
            quantity_unit: payload.quantity_unit,
            required_date: payload.required_date,
            required_time: payload.required_time,
            pickup_location: payload.pickup_location,
            pickup_coordinates: payload.pickup_coordinates,
            people_count: payload.people_count,
            special_instructions: payload.special_instructions,
            urgency_score: urgency,
            status: RequestStatus::Pending,
            donor_id: None,
            donor_name: None,
            availability_time: None,
            food_condition: None,
            volunteer_id: None,
            volunteer_name: None,
            co_volunteer_id: None,
            co_volunteer_name: None,
            escalation_reason: None,
            escalation_auto: false,
            delivery_photo: None,
            rating: None,
            feedback: None,
            created_at: Utc::now(),
            accepted_at: None,
            assigned_at: None,
            picked_up_at: None,
            in_transit_at: None,
            delivered_at: None,
            completed_at: None,
            cancelled_at: None,
        };

        self.state.requests.insert(request.id, request.clone());
        if let Some(mut entry) = self.state.participants.get_mut(&requester.id) {
            entry.total_requests += 1;
        }
        self.state.metrics.open_requests.inc();

        info!(
            request_id = %request.id,
            urgency = request.urgency_score,
            people_count = request.people_count,
            "food request created"
        );
        emit(&self.state.events_tx, DomainEvent::NewRequest(request.clone()));

        Ok(request)
    }

    fn donor_accept_inner(
        &self,
        actor_id: Uuid,
        request_id: Uuid,
        payload: AcceptDonation,
    ) -> Result<FoodRequest, AppError> {
        let donor = self.load_actor(actor_id, Role::Donor)?;

        let mut entry = self
            .state
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))?;

        if entry.status != RequestStatus::Pending {
            return Err(AppError::InvalidTransition(format!(
                "request is {}, only pending requests can be accepted",
                entry.status
            )));
        }

        entry.status = RequestStatus::AcceptedByDonor;
        entry.donor_id = Some(donor.id);
        entry.donor_name = Some(donor.name.clone());
        entry.availability_time = Some(payload.availability_time);
        entry.food_condition = Some(payload.food_condition);
        entry.accepted_at = Some(Utc::now());

        if let Some(mut donor_entry) = self.state.participants.get_mut(&donor.id) {
            donor_entry.total_donations += 1;
        }

        let start = Instant::now();
        let pool = assignment::volunteer_pool(&self.state);
        let primary = assignment::select_primary(&pool, &entry);
        let outcome = if primary.is_some() {
            "assigned"
        } else {
            "no_candidates"
        };
        self.state
            .metrics
            .assignment_latency_seconds
            .with_label_values(&[outcome])
            .observe(start.elapsed().as_secs_f64());

        if let Some(candidate) = primary {
            entry.status = RequestStatus::AssignedToVolunteer;
            entry.volunteer_id = Some(candidate.volunteer_id);
            entry.volunteer_name = Some(candidate.volunteer_name.clone());
            entry.assigned_at = Some(Utc::now());

            info!(
                request_id = %request_id,
                volunteer_id = %candidate.volunteer_id,
                score = candidate.selection_score,
                distance = %geo::display_distance(candidate.distance_km),
                "volunteer assigned"
            );

            if let Some(reason) = escalation::auto_escalation(
                candidate.capacity_score,
                entry.quantity,
                candidate.distance_km,
            ) {
                self.state
                    .metrics
                    .escalations_total
                    .with_label_values(&[reason.as_str()])
                    .inc();

                if let Some(co) = escalation::select_co_volunteer(&pool, candidate.volunteer_id) {
                    entry.co_volunteer_id = Some(co.id);
                    entry.co_volunteer_name = Some(co.name.clone());
                    entry.escalation_reason = Some(reason.as_str().to_string());
                    entry.escalation_auto = true;

                    info!(
                        request_id = %request_id,
                        co_volunteer_id = %co.id,
                        reason = reason.as_str(),
                        "co-volunteer pre-assigned"
                    );
                }
            }
        }

        let updated = entry.clone();
        drop(entry);

        emit(
            &self.state.events_tx,
            DomainEvent::RequestStatusChanged {
                request_id,
                status: updated.status,
            },
        );

        Ok(updated)
    }

    fn volunteer_update_inner(
        &self,
        actor_id: Uuid,
        request_id: Uuid,
        payload: StatusUpdate,
    ) -> Result<FoodRequest, AppError> {
        let actor = self.load_actor(actor_id, Role::Volunteer)?;

        let mut entry = self
            .state
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))?;

        let is_crew =
            entry.volunteer_id == Some(actor.id) || entry.co_volunteer_id == Some(actor.id);
        if !is_crew {
            return Err(AppError::InvalidTransition(
                "volunteer is not assigned to this request".to_string(),
            ));
        }

        let required_from = match payload.status {
            DeliveryStep::PickedUp => RequestStatus::AssignedToVolunteer,
            DeliveryStep::InTransit => RequestStatus::PickedUp,
            DeliveryStep::Delivered => RequestStatus::InTransit,
        };
        if entry.status != required_from {
            return Err(AppError::InvalidTransition(format!(
                "request is {}, expected {}",
                entry.status, required_from
            )));
        }

        let now = Utc::now();
        match payload.status {
            DeliveryStep::PickedUp => {
                entry.status = RequestStatus::PickedUp;
                entry.picked_up_at = Some(now);
            }
            DeliveryStep::InTransit => {
                entry.status = RequestStatus::InTransit;
                entry.in_transit_at = Some(now);
            }
            DeliveryStep::Delivered => {
                entry.status = RequestStatus::Delivered;
                entry.delivered_at = Some(now);
                if payload.delivery_photo.is_some() {
                    entry.delivery_photo = payload.delivery_photo.clone();
                }
            }
        }

        if payload.extra_volunteer_required && entry.co_volunteer_id.is_none() {
            let pool = assignment::volunteer_pool(&self.state);
            if let Some(co) = escalation::select_co_volunteer_manual(&pool, actor.id, &entry) {
                entry.co_volunteer_id = Some(co.id);
                entry.co_volunteer_name = Some(co.name.clone());
                entry.escalation_reason = payload.extra_volunteer_reason.clone();
                entry.escalation_auto = false;

                self.state
                    .metrics
                    .escalations_total
                    .with_label_values(&["manual"])
                    .inc();

                info!(
                    request_id = %request_id,
                    co_volunteer_id = %co.id,
                    "co-volunteer recruited on volunteer flag"
                );
            }
        }

        let updated = entry.clone();
        drop(entry);

        emit(
            &self.state.events_tx,
            DomainEvent::RequestStatusChanged {
                request_id,
                status: updated.status,
            },
        );

        Ok(updated)
    }

    fn confirm_receipt_inner(
        &self,
        actor_id: Uuid,
        request_id: Uuid,
        payload: ReceiptConfirmation,
    ) -> Result<FoodRequest, AppError> {
        let actor = self.load_actor(actor_id, Role::Requester)?;

        if let Some(rating) = payload.rating {
            if !(1..=5).contains(&rating) {
                return Err(AppError::BadRequest(
                    "rating must be between 1 and 5".to_string(),
                ));
            }
        }

        let mut entry = self
            .state
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))?;

        if entry.requester_id != actor.id {
            return Err(AppError::InvalidTransition(
                "request belongs to a different requester".to_string(),
            ));
        }
        if entry.status != RequestStatus::Delivered {
            return Err(AppError::InvalidTransition(format!(
                "request is {}, only delivered requests can be confirmed",
                entry.status
            )));
        }

        entry.status = RequestStatus::Completed;
        entry.completed_at = Some(Utc::now());
        entry.rating = payload.rating;
        entry.feedback = payload.feedback;

        if let Some(volunteer_id) = entry.volunteer_id {
            if let Some(mut volunteer) = self.state.participants.get_mut(&volunteer_id) {
                record_volunteer_completion(&mut volunteer);
            }
        }
        if let Some(mut requester) = self.state.participants.get_mut(&actor.id) {
            record_requester_completion(&mut requester);
        }

        self.state.metrics.open_requests.dec();

        let updated = entry.clone();
        drop(entry);

        info!(request_id = %request_id, "receipt confirmed");
        emit(
            &self.state.events_tx,
            DomainEvent::RequestCompleted { request_id },
        );

        Ok(updated)
    }

    fn cancel_inner(&self, actor_id: Uuid, request_id: Uuid) -> Result<FoodRequest, AppError> {
        let actor = self.load_actor(actor_id, Role::Requester)?;

        let mut entry = self
            .state
            .requests
            .get_mut(&request_id)
            .ok_or_else(|| AppError::NotFound(format!("request {request_id} not found")))?;

        if entry.requester_id != actor.id {
            return Err(AppError::InvalidTransition(
                "request belongs to a different requester".to_string(),
            ));
        }

        let cancellable = matches!(
            entry.status,
            RequestStatus::Pending
                | RequestStatus::AcceptedByDonor
                | RequestStatus::AssignedToVolunteer
        );
        if !cancellable {
            return Err(AppError::InvalidTransition(format!(
                "request is {}, cancellation is only possible before pickup",
                entry.status
            )));
        }

        entry.status = RequestStatus::Cancelled;
        entry.cancelled_at = Some(Utc::now());

        self.state.metrics.open_requests.dec();

        let updated = entry.clone();
        drop(entry);

        emit(
            &self.state.events_tx,
            DomainEvent::RequestStatusChanged {
                request_id,
                status: updated.status,
            },
        );

        Ok(updated)
    }

    fn load_actor(&self, actor_id: Uuid, expected: Role) -> Result<Participant, AppError> {
        let actor = self
            .state
            .participants
            .get(&actor_id)
            .ok_or_else(|| AppError::NotFound(format!("participant {actor_id} not found")))?
            .clone();

        if actor.role != expected {
            return Err(AppError::Forbidden(format!(
                "action requires the {expected:?} role"
            )));
        }
        Ok(actor)
    }

    fn record<T>(&self, action: &str, result: &Result<T, AppError>) {
        let outcome = if result.is_ok() { "success" } else { "error" };
        self.state
            .metrics
            .transitions_total
            .with_label_values(&[action, outcome])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use super::{
        AcceptDonation, CreateRequest, DeliveryStep, ReceiptConfirmation, RequestLifecycle,
        StatusUpdate,
    };
    use crate::error::AppError;
    use crate::models::participant::{
        GeoPoint, Participant, Role, TransportMode, VerificationStatus,
    };
    use crate::models::request::RequestStatus;
    use crate::notify::events::DomainEvent;
    use crate::state::AppState;

    fn add_participant(
        state: &AppState,
        id_seed: u128,
        role: Role,
        transport: Option<TransportMode>,
    ) -> Uuid {
        let id = Uuid::from_u128(id_seed);
        let verification = match role {
            Role::Requester => Some(VerificationStatus::Verified),
            _ => None,
        };
        state.participants.insert(
            id,
            Participant {
                id,
                name: format!("participant-{id_seed}"),
                email: format!("p{id_seed}@example.org"),
                role,
                organization: Some("Helping Hands".to_string()),
                location: "12 Depot Lane".to_string(),
                coordinates: Some(GeoPoint {
                    lat: 0.01,
                    lng: 0.01,
                }),
                transport_mode: transport,
                verification,
                verification_notes: None,
                reliability_score: 5.0,
                total_requests: 0,
                completed_requests: 0,
                total_donations: 0,
                completed_tasks: 0,
                created_at: Utc::now(),
            },
        );
        id
    }

    fn create_payload(quantity: u32, people_count: u32) -> CreateRequest {
        CreateRequest {
            food_type: "Cooked rice".to_string(),
            food_category: "veg".to_string(),
            quantity,
            quantity_unit: "kg".to_string(),
            required_date: "2030-01-01".to_string(),
            required_time: "12:00".to_string(),
            pickup_location: "Central kitchen".to_string(),
            pickup_coordinates: Some(GeoPoint { lat: 0.0, lng: 0.0 }),
            people_count,
            special_instructions: None,
        }
    }

    fn accept_payload() -> AcceptDonation {
        AcceptDonation {
            availability_time: "18:00".to_string(),
            food_condition: "fresh".to_string(),
        }
    }

    fn advance(
        lifecycle: &RequestLifecycle,
        volunteer: Uuid,
        request: Uuid,
        step: DeliveryStep,
    ) -> Result<crate::models::request::FoodRequest, AppError> {
        lifecycle.volunteer_update(
            volunteer,
            request,
            StatusUpdate {
                status: step,
                extra_volunteer_required: false,
                extra_volunteer_reason: None,
                delivery_photo: None,
            },
        )
    }

    #[test]
    fn unverified_requester_cannot_create() {
        let state = Arc::new(AppState::new(16));
        let requester = add_participant(&state, 1, Role::Requester, None);
        state
            .participants
            .get_mut(&requester)
            .unwrap()
            .verification = Some(VerificationStatus::Pending);

        let lifecycle = RequestLifecycle::new(state);
        let err = lifecycle
            .create(requester, create_payload(10, 40))
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn create_computes_urgency_and_counts_the_request() {
        let state = Arc::new(AppState::new(16));
        let requester = add_participant(&state, 1, Role::Requester, None);

        let lifecycle = RequestLifecycle::new(state.clone());
        let request = lifecycle.create(requester, create_payload(10, 40)).unwrap();

        assert_eq!(request.status, RequestStatus::Pending);
        assert!((0.0..=10.0).contains(&request.urgency_score));
        assert_eq!(
            state.participants.get(&requester).unwrap().total_requests,
            1
        );
    }

    #[test]
    fn full_lifecycle_updates_reliability_on_completion() {
        let state = Arc::new(AppState::new(16));
        let requester = add_participant(&state, 1, Role::Requester, None);
        let donor = add_participant(&state, 2, Role::Donor, None);
        let volunteer = add_participant(&state, 3, Role::Volunteer, Some(TransportMode::Van));

        let lifecycle = RequestLifecycle::new(state.clone());
        let request = lifecycle.create(requester, create_payload(10, 40)).unwrap();

        let accepted = lifecycle
            .donor_accept(donor, request.id, accept_payload())
            .unwrap();
        assert_eq!(accepted.status, RequestStatus::AssignedToVolunteer);
        assert_eq!(accepted.volunteer_id, Some(volunteer));
        assert!(accepted.accepted_at.is_some());
        assert!(accepted.assigned_at.is_some());
        assert_eq!(state.participants.get(&donor).unwrap().total_donations, 1);

        advance(&lifecycle, volunteer, request.id, DeliveryStep::PickedUp).unwrap();
        advance(&lifecycle, volunteer, request.id, DeliveryStep::InTransit).unwrap();
        let delivered = lifecycle
            .volunteer_update(
                volunteer,
                request.id,
                StatusUpdate {
                    status: DeliveryStep::Delivered,
                    extra_volunteer_required: false,
                    extra_volunteer_reason: None,
                    delivery_photo: Some("photo-ref-1".to_string()),
                },
            )
            .unwrap();
        assert_eq!(delivered.status, RequestStatus::Delivered);
        assert_eq!(delivered.delivery_photo.as_deref(), Some("photo-ref-1"));

        let completed = lifecycle
            .confirm_receipt(
                requester,
                request.id,
                ReceiptConfirmation {
                    rating: Some(5),
                    feedback: Some("on time".to_string()),
                },
            )
            .unwrap();
        assert_eq!(completed.status, RequestStatus::Completed);

        let vol = state.participants.get(&volunteer).unwrap();
        assert_eq!(vol.completed_tasks, 1);
        assert_eq!(vol.reliability_score, 5.1);

        let req = state.participants.get(&requester).unwrap();
        assert_eq!(req.completed_requests, 1);
        assert_eq!(req.reliability_score, 10.0);
    }

    #[test]
    fn accept_with_empty_pool_stays_accepted_by_donor() {
        let state = Arc::new(AppState::new(16));
        let requester = add_participant(&state, 1, Role::Requester, None);
        let donor = add_participant(&state, 2, Role::Donor, None);

        let lifecycle = RequestLifecycle::new(state);
        let request = lifecycle.create(requester, create_payload(10, 40)).unwrap();
        let accepted = lifecycle
            .donor_accept(donor, request.id, accept_payload())
            .unwrap();

        assert_eq!(accepted.status, RequestStatus::AcceptedByDonor);
        assert!(accepted.volunteer_id.is_none());
    }

    #[test]
    fn second_accept_loses_the_guard_window() {
        let state = Arc::new(AppState::new(16));
        let requester = add_participant(&state, 1, Role::Requester, None);
        let donor_a = add_participant(&state, 2, Role::Donor, None);
        let donor_b = add_participant(&state, 3, Role::Donor, None);

        let lifecycle = RequestLifecycle::new(state);
        let request = lifecycle.create(requester, create_payload(10, 40)).unwrap();

        lifecycle
            .donor_accept(donor_a, request.id, accept_payload())
            .unwrap();
        let err = lifecycle
            .donor_accept(donor_b, request.id, accept_payload())
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[test]
    fn concurrent_accepts_admit_exactly_one_winner() {
        let state = Arc::new(AppState::new(16));
        let requester = add_participant(&state, 1, Role::Requester, None);
        let donor_a = add_participant(&state, 2, Role::Donor, None);
        let donor_b = add_participant(&state, 3, Role::Donor, None);

        let lifecycle = RequestLifecycle::new(state.clone());
        let request = lifecycle.create(requester, create_payload(10, 40)).unwrap();

        let handles: Vec<_> = [donor_a, donor_b]
            .into_iter()
            .map(|donor| {
                let state = state.clone();
                let request_id = request.id;
                std::thread::spawn(move || {
                    RequestLifecycle::new(state).donor_accept(
                        donor,
                        request_id,
                        AcceptDonation {
                            availability_time: "18:00".to_string(),
                            food_condition: "fresh".to_string(),
                        },
                    )
                })
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(AppError::InvalidTransition(_)))));
    }

    #[test]
    fn heavy_load_escalation_pre_assigns_a_co_volunteer() {
        let state = Arc::new(AppState::new(16));
        let requester = add_participant(&state, 1, Role::Requester, None);
        let donor = add_participant(&state, 2, Role::Donor, None);
        let walker = add_participant(&state, 3, Role::Volunteer, Some(TransportMode::OnFoot));
        let backup = add_participant(&state, 4, Role::Volunteer, Some(TransportMode::Bicycle));
        // Make the backup slightly less attractive as primary so the walker
        // wins the main slot and triggers escalation.
        state
            .participants
            .get_mut(&backup)
            .unwrap()
            .reliability_score = 4.0;
        state
            .participants
            .get_mut(&walker)
            .unwrap()
            .reliability_score = 9.0;

        let lifecycle = RequestLifecycle::new(state);
        let request = lifecycle.create(requester, create_payload(150, 200)).unwrap();
        let accepted = lifecycle
            .donor_accept(donor, request.id, accept_payload())
            .unwrap();

        assert_eq!(accepted.volunteer_id, Some(walker));
        assert_eq!(accepted.co_volunteer_id, Some(backup));
        assert_eq!(accepted.escalation_reason.as_deref(), Some("heavy_load"));
        assert!(accepted.escalation_auto);
    }

    #[test]
    fn volunteer_flag_recruits_a_co_volunteer() {
        let state = Arc::new(AppState::new(16));
        let requester = add_participant(&state, 1, Role::Requester, None);
        let donor = add_participant(&state, 2, Role::Donor, None);
        let primary = add_participant(&state, 3, Role::Volunteer, Some(TransportMode::Van));
        let helper = add_participant(&state, 4, Role::Volunteer, Some(TransportMode::Bicycle));
        state
            .participants
            .get_mut(&helper)
            .unwrap()
            .reliability_score = 4.0;

        let lifecycle = RequestLifecycle::new(state);
        let request = lifecycle.create(requester, create_payload(10, 40)).unwrap();
        let accepted = lifecycle
            .donor_accept(donor, request.id, accept_payload())
            .unwrap();
        assert_eq!(accepted.volunteer_id, Some(primary));
        assert!(accepted.co_volunteer_id.is_none());

        let updated = lifecycle
            .volunteer_update(
                primary,
                request.id,
                StatusUpdate {
                    status: DeliveryStep::PickedUp,
                    extra_volunteer_required: true,
                    extra_volunteer_reason: Some("stairs at pickup".to_string()),
                    delivery_photo: None,
                },
            )
            .unwrap();

        assert_eq!(updated.co_volunteer_id, Some(helper));
        assert_eq!(
            updated.escalation_reason.as_deref(),
            Some("stairs at pickup")
        );
        assert!(!updated.escalation_auto);
    }

    #[test]
    fn skipping_ahead_in_the_chain_is_rejected() {
        let state = Arc::new(AppState::new(16));
        let requester = add_participant(&state, 1, Role::Requester, None);
        let donor = add_participant(&state, 2, Role::Donor, None);
        let volunteer = add_participant(&state, 3, Role::Volunteer, Some(TransportMode::Van));

        let lifecycle = RequestLifecycle::new(state);
        let request = lifecycle.create(requester, create_payload(10, 40)).unwrap();
        lifecycle
            .donor_accept(donor, request.id, accept_payload())
            .unwrap();

        // assigned_to_volunteer -> delivered skips two edges
        let err = advance(&lifecycle, volunteer, request.id, DeliveryStep::Delivered).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[test]
    fn non_assigned_volunteer_cannot_update_status() {
        let state = Arc::new(AppState::new(16));
        let requester = add_participant(&state, 1, Role::Requester, None);
        let donor = add_participant(&state, 2, Role::Donor, None);
        let assigned = add_participant(&state, 3, Role::Volunteer, Some(TransportMode::Van));
        let outsider = add_participant(&state, 4, Role::Volunteer, Some(TransportMode::Bicycle));
        state
            .participants
            .get_mut(&outsider)
            .unwrap()
            .reliability_score = 1.0;

        let lifecycle = RequestLifecycle::new(state);
        let request = lifecycle.create(requester, create_payload(10, 40)).unwrap();
        let accepted = lifecycle
            .donor_accept(donor, request.id, accept_payload())
            .unwrap();
        assert_eq!(accepted.volunteer_id, Some(assigned));

        let err = advance(&lifecycle, outsider, request.id, DeliveryStep::PickedUp).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[test]
    fn confirming_twice_fails_the_second_time() {
        let state = Arc::new(AppState::new(16));
        let requester = add_participant(&state, 1, Role::Requester, None);
        let donor = add_participant(&state, 2, Role::Donor, None);
        let volunteer = add_participant(&state, 3, Role::Volunteer, Some(TransportMode::Van));

        let lifecycle = RequestLifecycle::new(state.clone());
        let request = lifecycle.create(requester, create_payload(10, 40)).unwrap();
        lifecycle
            .donor_accept(donor, request.id, accept_payload())
            .unwrap();
        advance(&lifecycle, volunteer, request.id, DeliveryStep::PickedUp).unwrap();
        advance(&lifecycle, volunteer, request.id, DeliveryStep::InTransit).unwrap();
        advance(&lifecycle, volunteer, request.id, DeliveryStep::Delivered).unwrap();

        let confirm = ReceiptConfirmation {
            rating: None,
            feedback: None,
        };
        lifecycle
            .confirm_receipt(requester, request.id, confirm)
            .unwrap();

        let err = lifecycle
            .confirm_receipt(
                requester,
                request.id,
                ReceiptConfirmation {
                    rating: None,
                    feedback: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));

        // The tracker must not have double-counted.
        assert_eq!(
            state.participants.get(&volunteer).unwrap().completed_tasks,
            1
        );
    }

    #[test]
    fn cancel_is_rejected_once_picked_up() {
        let state = Arc::new(AppState::new(16));
        let requester = add_participant(&state, 1, Role::Requester, None);
        let donor = add_participant(&state, 2, Role::Donor, None);
        let volunteer = add_participant(&state, 3, Role::Volunteer, Some(TransportMode::Van));

        let lifecycle = RequestLifecycle::new(state);
        let request = lifecycle.create(requester, create_payload(10, 40)).unwrap();
        lifecycle
            .donor_accept(donor, request.id, accept_payload())
            .unwrap();
        advance(&lifecycle, volunteer, request.id, DeliveryStep::PickedUp).unwrap();

        let err = lifecycle.cancel(requester, request.id).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));
    }

    #[test]
    fn pending_request_can_be_cancelled_by_its_requester() {
        let state = Arc::new(AppState::new(16));
        let requester = add_participant(&state, 1, Role::Requester, None);
        let stranger = add_participant(&state, 2, Role::Requester, None);

        let lifecycle = RequestLifecycle::new(state);
        let request = lifecycle.create(requester, create_payload(10, 40)).unwrap();

        let err = lifecycle.cancel(stranger, request.id).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));

        let cancelled = lifecycle.cancel(requester, request.id).unwrap();
        assert_eq!(cancelled.status, RequestStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
    }

    #[test]
    fn transitions_emit_domain_events() {
        let state = Arc::new(AppState::new(16));
        let requester = add_participant(&state, 1, Role::Requester, None);
        let donor = add_participant(&state, 2, Role::Donor, None);

        let mut rx = state.events_tx.subscribe();
        let lifecycle = RequestLifecycle::new(state);
        let request = lifecycle.create(requester, create_payload(10, 40)).unwrap();
        lifecycle
            .donor_accept(donor, request.id, accept_payload())
            .unwrap();

        assert!(matches!(rx.try_recv().unwrap(), DomainEvent::NewRequest(_)));
        assert!(matches!(
            rx.try_recv().unwrap(),
            DomainEvent::RequestStatusChanged { .. }
        ));
    }
}
