use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Requester,
    Donor,
    Volunteer,
    Coordinator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Van,
    Car,
    TwoWheeler,
    Bicycle,
    OnFoot,
}

impl TransportMode {
    pub fn base_capacity(self) -> f64 {
        match self {
            TransportMode::Van => 10.0,
            TransportMode::Car => 7.0,
            TransportMode::TwoWheeler => 5.0,
            TransportMode::Bicycle => 3.0,
            TransportMode::OnFoot => 2.0,
        }
    }

    /// Unrecognized mode strings fall back to the mid-tier two-wheeler.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "van" => TransportMode::Van,
            "car" => TransportMode::Car,
            "two_wheeler" => TransportMode::TwoWheeler,
            "bicycle" => TransportMode::Bicycle,
            "on_foot" => TransportMode::OnFoot,
            _ => TransportMode::TwoWheeler,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub organization: Option<String>,
    pub location: String,
    pub coordinates: Option<GeoPoint>,
    pub transport_mode: Option<TransportMode>,
    /// Requesters only; other roles carry `None`.
    pub verification: Option<VerificationStatus>,
    pub verification_notes: Option<String>,
    pub reliability_score: f64,
    pub total_requests: u32,
    pub completed_requests: u32,
    pub total_donations: u32,
    pub completed_tasks: u32,
    pub created_at: DateTime<Utc>,
}

impl Participant {
    pub fn is_verified_requester(&self) -> bool {
        self.role == Role::Requester && self.verification == Some(VerificationStatus::Verified)
    }
}

#[cfg(test)]
mod tests {
    use super::TransportMode;

    #[test]
    fn unrecognized_transport_mode_defaults_to_mid_tier() {
        let mode = TransportMode::parse("hoverboard");
        assert_eq!(mode, TransportMode::TwoWheeler);
        assert_eq!(mode.base_capacity(), 5.0);
    }

    #[test]
    fn base_capacities_rank_by_vehicle_size() {
        assert_eq!(TransportMode::Van.base_capacity(), 10.0);
        assert_eq!(TransportMode::Car.base_capacity(), 7.0);
        assert_eq!(TransportMode::Bicycle.base_capacity(), 3.0);
        assert_eq!(TransportMode::OnFoot.base_capacity(), 2.0);
    }
}
