use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::participant::GeoPoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    AcceptedByDonor,
    AssignedToVolunteer,
    PickedUp,
    InTransit,
    Delivered,
    Completed,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::AcceptedByDonor => "accepted_by_donor",
            RequestStatus::AssignedToVolunteer => "assigned_to_volunteer",
            RequestStatus::PickedUp => "picked_up",
            RequestStatus::InTransit => "in_transit",
            RequestStatus::Delivered => "delivered",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    HeavyLoad,
    LongDistance,
    CapacityConstraint,
}

impl EscalationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            EscalationReason::HeavyLoad => "heavy_load",
            EscalationReason::LongDistance => "long_distance",
            EscalationReason::CapacityConstraint => "capacity_constraint",
        }
    }
}

/// A unit of food need, tracked from creation to completion. Records are
/// never deleted; terminal requests remain as an audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodRequest {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub requester_name: String,
    pub requester_organization: String,
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
    pub urgency_score: f64,
    pub status: RequestStatus,
    pub donor_id: Option<Uuid>,
    pub donor_name: Option<String>,
    pub availability_time: Option<String>,
    pub food_condition: Option<String>,
    pub volunteer_id: Option<Uuid>,
    pub volunteer_name: Option<String>,
    pub co_volunteer_id: Option<Uuid>,
    pub co_volunteer_name: Option<String>,
    pub escalation_reason: Option<String>,
    pub escalation_auto: bool,
    pub delivery_photo: Option<String>,
    pub rating: Option<u8>,
    pub feedback: Option<String>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub in_transit_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}
