use crate::models::participant::Participant;

const MAX_RELIABILITY: f64 = 10.0;
const VOLUNTEER_BASELINE: f64 = 5.0;

/// Reward a volunteer for a completed delivery. The score starts at the 5.0
/// default and climbs toward 10 with history; there is no decay path for
/// abandoned or failed tasks.
pub fn record_volunteer_completion(volunteer: &mut Participant) {
    volunteer.completed_tasks += 1;
    volunteer.reliability_score =
        (VOLUNTEER_BASELINE + volunteer.completed_tasks as f64 / 10.0).min(MAX_RELIABILITY);
}

/// Update a requester's completion-ratio score. `total_requests` was
/// incremented at creation time, so the ratio is well-defined here.
pub fn record_requester_completion(requester: &mut Participant) {
    requester.completed_requests += 1;
    let total = requester.total_requests.max(1);
    requester.reliability_score =
        ((requester.completed_requests as f64 / total as f64) * 10.0).min(MAX_RELIABILITY);
}
