use crate::models::participant::TransportMode;

/// Effective carrying capacity of a volunteer for one job. Unclamped: a
/// large or distant job on weak transport can score negative.
pub fn capacity_score(mode: TransportMode, distance_km: f64, quantity: u32) -> f64 {
    let distance_penalty = (distance_km / 10.0).min(3.0);
    let quantity_penalty = ((quantity as f64 - 50.0) / 20.0).max(0.0);
    mode.base_capacity() - distance_penalty - quantity_penalty
}
