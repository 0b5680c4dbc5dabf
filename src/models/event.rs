use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::actor::{Actor, Role};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Room {
    Admin,
    AllDrivers,
    Driver(Uuid),
    Customer(Uuid),
}

impl Room {
    pub fn admits(&self, actor: &Actor) -> bool {
        match (self, actor.role) {
            (Room::Admin, Role::Admin) => true,
            (Room::AllDrivers, Role::Driver | Role::Admin) => true,
            (Room::Driver(id), Role::Driver) => *id == actor.id,
            (Room::Customer(id), Role::Customer) => *id == actor.id,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum EventName {
    NewOrder,
    OrderAssignment,
    OrderStatusUpdate,
    DriverStatusUpdate,
    DriverQueueUpdate,
    DriverLocationUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchEvent {
    pub room: Room,
    pub event: EventName,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}
