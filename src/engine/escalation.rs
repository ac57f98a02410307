use uuid::Uuid;

use crate::engine::assignment::distance_to_pickup;
use crate::models::participant::Participant;
use crate::models::request::{EscalationReason, FoodRequest};

const ESCALATION_CAPACITY_FLOOR: f64 = 2.0;
const HEAVY_LOAD_QUANTITY: u32 = 100;
const LONG_DISTANCE_KM: f64 = 30.0;

/// Decide whether a freshly assigned task needs a second volunteer. Fires
/// when the assignee's capacity score falls below the floor; the reason is
/// picked by priority: load, then distance, then general capacity.
pub fn auto_escalation(
    capacity_score: f64,
    quantity: u32,
    distance_km: f64,
) -> Option<EscalationReason> {
    if capacity_score >= ESCALATION_CAPACITY_FLOOR {
        return None;
    }

    let reason = if quantity > HEAVY_LOAD_QUANTITY {
        EscalationReason::HeavyLoad
    } else if distance_km > LONG_DISTANCE_KM {
        EscalationReason::LongDistance
    } else {
        EscalationReason::CapacityConstraint
    };
    Some(reason)
}

/// Co-volunteer for an automatic escalation: highest reliability among the
/// remaining volunteers, ties keeping the first encountered. `None` when the
/// primary is the only volunteer; the task then proceeds single-handed.
pub fn select_co_volunteer(pool: &[Participant], primary_id: Uuid) -> Option<&Participant> {
    let mut best: Option<&Participant> = None;

    for volunteer in pool.iter().filter(|v| v.id != primary_id) {
        match best {
            Some(current) if volunteer.reliability_score <= current.reliability_score => {}
            _ => best = Some(volunteer),
        }
    }

    best
}

/// Co-volunteer for a manual flag raised mid-delivery. The original
/// volunteer already owns primary capacity, so candidates are ranked on
/// reliability and closeness alone.
pub fn select_co_volunteer_manual<'a>(
    pool: &'a [Participant],
    primary_id: Uuid,
    request: &FoodRequest,
) -> Option<&'a Participant> {
    let mut best: Option<(&Participant, f64)> = None;

    for volunteer in pool.iter().filter(|v| v.id != primary_id) {
        let score = volunteer.reliability_score - distance_to_pickup(volunteer, request) / 10.0;
        match best {
            Some((_, current)) if score <= current => {}
            _ => best = Some((volunteer, score)),
        }
    }

    best.map(|(volunteer, _)| volunteer)
}
