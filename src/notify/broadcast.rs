use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::event::{DispatchEvent, EventName, Room};
use crate::notify::EventNotifier;

/// Event fan-out over a tokio broadcast channel; websocket sessions subscribe
/// and filter by room.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<DispatchEvent>,
}

impl BroadcastNotifier {
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _unused_rx) = broadcast::channel(buffer_size.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.tx.subscribe()
    }
}

impl EventNotifier for BroadcastNotifier {
    fn publish(&self, room: Room, event: EventName, data: Value) {
        let message = DispatchEvent {
            room,
            event,
            data,
            timestamp: Utc::now(),
        };

        // No subscribers is the normal idle case.
        if self.tx.send(message).is_err() {
            debug!(?event, ?room, "event dropped: no listeners");
        }
    }
}
