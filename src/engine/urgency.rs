use chrono::{DateTime, NaiveDateTime, Utc};

const TIME_WEIGHT: f64 = 0.5;
const QUANTITY_WEIGHT: f64 = 0.3;
const HISTORY_WEIGHT: f64 = 0.2;

/// Score used when the deadline cannot be parsed or no history exists.
/// Urgency scoring must never block request creation.
pub const NEUTRAL_SCORE: f64 = 5.0;

/// Composite 0-10 urgency for a new request. `history` is the requester's
/// reliability score when known.
pub fn urgency_score(
    people_count: u32,
    required_date: &str,
    required_time: &str,
    history: Option<f64>,
) -> f64 {
    urgency_score_at(people_count, required_date, required_time, history, Utc::now())
}

pub(crate) fn urgency_score_at(
    people_count: u32,
    required_date: &str,
    required_time: &str,
    history: Option<f64>,
    now: DateTime<Utc>,
) -> f64 {
    let Some(required_at) = parse_deadline(required_date, required_time) else {
        return NEUTRAL_SCORE;
    };

    let time_diff_hours = (required_at - now).num_seconds() as f64 / 3600.0;

    // Deadlines already in the past clamp to 10, same as one due right now.
    let time_score = (10.0 - (time_diff_hours / 24.0) * 2.0).clamp(0.0, 10.0);
    let quantity_score = ((people_count as f64 / 100.0) * 10.0).clamp(0.0, 10.0);
    let history_score = history.map_or(NEUTRAL_SCORE, |score| score.min(10.0));

    let urgency =
        time_score * TIME_WEIGHT + quantity_score * QUANTITY_WEIGHT + history_score * HISTORY_WEIGHT;
    round2(urgency)
}

fn parse_deadline(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let raw = format!("{date}T{time}");
    let naive = NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M"))
        .ok()?;
    Some(naive.and_utc())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
