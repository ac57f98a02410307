use crate::engine::capacity::capacity_score;
use crate::geo;
use crate::models::candidate::AssignmentCandidate;
use crate::models::participant::{Participant, Role, TransportMode};
use crate::models::request::FoodRequest;
use crate::state::AppState;

/// Placeholder used when either end of a pairing has no coordinates, so
/// text-only locations still participate in matching.
pub const FALLBACK_DISTANCE_KM: f64 = 25.0;

/// Snapshot of all registered volunteers in registration order. Cloning each
/// entry gives a consistent per-record read; volunteers registering mid-scan
/// may or may not be seen, which the design accepts.
pub fn volunteer_pool(state: &AppState) -> Vec<Participant> {
    let mut pool: Vec<Participant> = state
        .participants
        .iter()
        .filter(|entry| entry.value().role == Role::Volunteer)
        .map(|entry| entry.value().clone())
        .collect();

    pool.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    pool
}

pub fn distance_to_pickup(volunteer: &Participant, request: &FoodRequest) -> f64 {
    geo::distance_km_safe(
        volunteer.coordinates.as_ref(),
        request.pickup_coordinates.as_ref(),
    )
    .unwrap_or(FALLBACK_DISTANCE_KM)
}

/// Score one volunteer against one request.
pub fn evaluate(volunteer: &Participant, request: &FoodRequest) -> AssignmentCandidate {
    let distance_km = distance_to_pickup(volunteer, request);
    let mode = volunteer.transport_mode.unwrap_or(TransportMode::OnFoot);
    let capacity = capacity_score(mode, distance_km, request.quantity);
    let selection_score = capacity + volunteer.reliability_score / 2.0 - distance_km / 10.0;

    AssignmentCandidate {
        volunteer_id: volunteer.id,
        volunteer_name: volunteer.name.clone(),
        distance_km,
        capacity_score: capacity,
        selection_score,
    }
}

/// Pick the strictly best-scoring volunteer; ties keep the first encountered.
/// An empty pool yields `None`, which is a valid outcome, not an error.
pub fn select_primary(pool: &[Participant], request: &FoodRequest) -> Option<AssignmentCandidate> {
    let mut best: Option<AssignmentCandidate> = None;

    for volunteer in pool {
        let candidate = evaluate(volunteer, request);
        match &best {
            Some(current) if candidate.selection_score <= current.selection_score => {}
            _ => best = Some(candidate),
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{evaluate, select_primary, FALLBACK_DISTANCE_KM};
    use crate::models::participant::{GeoPoint, Participant, Role, TransportMode};
    use crate::models::request::{FoodRequest, RequestStatus};

    fn volunteer(
        id_seed: u128,
        name: &str,
        mode: TransportMode,
        reliability: f64,
        coordinates: Option<GeoPoint>,
    ) -> Participant {
        Participant {
            id: Uuid::from_u128(id_seed),
            name: name.to_string(),
            email: format!("{name}@example.org"),
            role: Role::Volunteer,
            organization: None,
            location: "Sector 4".to_string(),
            coordinates,
            transport_mode: Some(mode),
            verification: None,
            verification_notes: None,
            reliability_score: reliability,
            total_requests: 0,
            completed_requests: 0,
            total_donations: 0,
            completed_tasks: 0,
            created_at: Utc::now(),
        }
    }

    fn request(quantity: u32, pickup: Option<GeoPoint>) -> FoodRequest {
        FoodRequest {
            id: Uuid::from_u128(99),
            requester_id: Uuid::from_u128(100),
            requester_name: "Shelter".to_string(),
            requester_organization: "Shelter Org".to_string(),
            food_type: "Cooked meals".to_string(),
            food_category: "veg".to_string(),
            quantity,
            quantity_unit: "kg".to_string(),
            required_date: "2025-06-01".to_string(),
            required_time: "12:00".to_string(),
            pickup_location: "Main St 1".to_string(),
            pickup_coordinates: pickup,
            people_count: 40,
            special_instructions: None,
            urgency_score: 5.0,
            status: RequestStatus::AcceptedByDonor,
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
        }
    }

    #[test]
    fn nearby_van_beats_distant_walker() {
        let pickup = GeoPoint { lat: 0.0, lng: 0.0 };
        // ~50 km and ~5 km north of the pickup.
        let walker = volunteer(
            1,
            "walker",
            TransportMode::OnFoot,
            5.0,
            Some(GeoPoint { lat: 0.45, lng: 0.0 }),
        );
        let driver = volunteer(
            2,
            "driver",
            TransportMode::Van,
            5.0,
            Some(GeoPoint {
                lat: 0.045,
                lng: 0.0,
            }),
        );

        let pool = vec![walker, driver];
        let winner = select_primary(&pool, &request(10, Some(pickup))).unwrap();
        assert_eq!(winner.volunteer_name, "driver");
    }

    #[test]
    fn ties_keep_the_first_encountered() {
        let a = volunteer(1, "first", TransportMode::Car, 5.0, None);
        let b = volunteer(2, "second", TransportMode::Car, 5.0, None);

        let winner = select_primary(&[a, b], &request(10, None)).unwrap();
        assert_eq!(winner.volunteer_name, "first");
    }

    #[test]
    fn empty_pool_selects_nobody() {
        assert!(select_primary(&[], &request(10, None)).is_none());
    }

    #[test]
    fn missing_coordinates_use_the_fallback_distance() {
        let v = volunteer(1, "nowhere", TransportMode::Car, 5.0, None);
        let candidate = evaluate(&v, &request(10, None));
        assert_eq!(candidate.distance_km, FALLBACK_DISTANCE_KM);
    }

    #[test]
    fn volunteer_without_transport_is_scored_on_foot() {
        let mut v = volunteer(1, "unlisted", TransportMode::Car, 5.0, None);
        v.transport_mode = None;
        let by_default = evaluate(&v, &request(10, None));
        v.transport_mode = Some(TransportMode::OnFoot);
        let explicit = evaluate(&v, &request(10, None));
        assert_eq!(by_default.capacity_score, explicit.capacity_score);
    }
}
