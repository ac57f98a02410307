use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::participant::VerificationStatus;
use crate::models::request::{FoodRequest, RequestStatus};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum DomainEvent {
    NewRequest(FoodRequest),
    RequestStatusChanged {
        request_id: Uuid,
        status: RequestStatus,
    },
    RequestCompleted {
        request_id: Uuid,
    },
    VerificationUpdated {
        participant_id: Uuid,
        status: VerificationStatus,
    },
}

/// Fire-and-forget: a send with no live subscribers is not a failure, and a
/// failed emission never rolls back the transition that produced it.
pub fn emit(tx: &broadcast::Sender<DomainEvent>, event: DomainEvent) {
    let _ = tx.send(event);
}
