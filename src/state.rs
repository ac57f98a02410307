use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::participant::Participant;
use crate::models::request::FoodRequest;
use crate::notify::email::{LogMailer, Mailer};
use crate::notify::events::DomainEvent;
use crate::observability::metrics::Metrics;

/// Shared in-process store. Per-record `DashMap` entry locks realize the
/// compare-and-set discipline: a transition holds its request's entry for
/// the full read-guard-write window.
pub struct AppState {
    pub participants: DashMap<Uuid, Participant>,
    pub requests: DashMap<Uuid, FoodRequest>,
    pub events_tx: broadcast::Sender<DomainEvent>,
    pub mailer: Arc<dyn Mailer>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            participants: DashMap::new(),
            requests: DashMap::new(),
            events_tx,
            mailer: Arc::new(LogMailer),
            metrics: Metrics::new(),
        }
    }
}
