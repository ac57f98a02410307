use uuid::Uuid;

/// One (volunteer, request) pairing scored during a matching run. Lives only
/// for the duration of a single assignment decision and is never persisted.
#[derive(Debug, Clone)]
pub struct AssignmentCandidate {
    pub volunteer_id: Uuid,
    pub volunteer_name: String,
    pub distance_km: f64,
    pub capacity_score: f64,
    pub selection_score: f64,
}
