use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::models::notification::{Notification, NotificationKind};
use crate::notify::NotificationSink;

/// In-process notification store, one inbox per recipient, newest last.
#[derive(Default)]
pub struct NotificationInbox {
    inboxes: DashMap<Uuid, Vec<Notification>>,
}

impl NotificationInbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_recipient(&self, recipient_id: Uuid) -> Vec<Notification> {
        self.inboxes
            .get(&recipient_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }
}

impl NotificationSink for NotificationInbox {
    fn notify(&self, recipient_id: Uuid, kind: NotificationKind, data: Value) {
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient_id,
            kind,
            data,
            read: false,
            created_at: Utc::now(),
        };

        info!(recipient_id = %recipient_id, ?kind, "notification stored");
        self.inboxes
            .entry(recipient_id)
            .or_default()
            .push(notification);
    }
}
