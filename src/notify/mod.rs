//! Outbound collaborators of the dispatch core.
//!
//! Both seams are fire-and-forget: the core never waits on delivery and a
//! failed or unheard publish never fails the mutating call.

pub mod broadcast;
pub mod inbox;

use serde_json::Value;
use uuid::Uuid;

use crate::models::event::{EventName, Room};
use crate::models::notification::NotificationKind;

pub use broadcast::BroadcastNotifier;
pub use inbox::NotificationInbox;

/// Real-time push of state changes to rooms of connected clients.
pub trait EventNotifier: Send + Sync {
    fn publish(&self, room: Room, event: EventName, data: Value);
}

/// Durable per-user notifications (payment receipts, order updates).
pub trait NotificationSink: Send + Sync {
    fn notify(&self, recipient_id: Uuid, kind: NotificationKind, data: Value);
}
