use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_QUEUE_SIZE: u8 = 1;
pub const MAX_QUEUE_SIZE: u8 = 10;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DriverAvailability {
    Free,
    Busy,
    Offline,
}

impl DriverAvailability {
    pub fn as_str(self) -> &'static str {
        match self {
            DriverAvailability::Free => "free",
            DriverAvailability::Busy => "busy",
            DriverAvailability::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub updated_at: DateTime<Utc>,
}

impl Location {
    pub fn at(point: GeoPoint, now: DateTime<Utc>) -> Self {
        Self {
            latitude: point.latitude,
            longitude: point.longitude,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub order_id: Uuid,
    pub assigned_at: DateTime<Utc>,
    pub priority: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub availability: DriverAvailability,
    pub current_order: Option<Uuid>,
    pub queue: Vec<QueueEntry>,
    pub max_queue_size: u8,
    pub location: Option<Location>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    pub fn queue_has_room(&self) -> bool {
        self.queue.len() < usize::from(self.max_queue_size)
    }

    pub fn holds(&self, order_id: Uuid) -> bool {
        self.current_order == Some(order_id)
            || self.queue.iter().any(|entry| entry.order_id == order_id)
    }

    /// Every order currently bound to this driver, current first.
    pub fn bound_orders(&self) -> Vec<Uuid> {
        self.current_order
            .into_iter()
            .chain(self.queue.iter().map(|entry| entry.order_id))
            .collect()
    }
}
