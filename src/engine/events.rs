//! Room routing for state-change events.

use serde_json::json;
use uuid::Uuid;

use crate::models::driver::Driver;
use crate::models::event::{EventName, Room};
use crate::models::order::Order;
use crate::notify::EventNotifier;

pub fn new_order(events: &dyn EventNotifier, order: &Order) {
    events.publish(
        Room::Admin,
        EventName::NewOrder,
        json!({
            "orderId": order.id,
            "orderNumber": order.order_number,
            "customerId": order.customer_id,
            "totalAmount": order.total_amount,
        }),
    );
}

pub fn order_assignment(events: &dyn EventNotifier, order: &Order, driver: &Driver) {
    let data = json!({
        "orderId": order.id,
        "orderNumber": order.order_number,
        "driverId": driver.id,
        "driverName": driver.name,
    });

    for room in [
        Room::Admin,
        Room::Driver(driver.id),
        Room::Customer(order.customer_id),
    ] {
        events.publish(room, EventName::OrderAssignment, data.clone());
    }
}

pub fn order_status(events: &dyn EventNotifier, order: &Order, updated_by: Uuid) {
    let data = json!({
        "orderId": order.id,
        "orderNumber": order.order_number,
        "status": order.status,
        "driverId": order.driver_id,
        "updatedBy": updated_by,
    });

    for room in [
        Room::Admin,
        Room::AllDrivers,
        Room::Customer(order.customer_id),
    ] {
        events.publish(room, EventName::OrderStatusUpdate, data.clone());
    }
}

pub fn driver_status(events: &dyn EventNotifier, driver: &Driver) {
    let data = json!({
        "driverId": driver.id,
        "status": driver.availability,
        "currentOrder": driver.current_order,
        "location": driver.location,
    });

    for room in [Room::Admin, Room::Driver(driver.id)] {
        events.publish(room, EventName::DriverStatusUpdate, data.clone());
    }
}

pub fn driver_queue(events: &dyn EventNotifier, driver: &Driver) {
    let data = json!({
        "driverId": driver.id,
        "currentOrder": driver.current_order,
        "queue": driver.queue,
    });

    for room in [Room::Admin, Room::Driver(driver.id)] {
        events.publish(room, EventName::DriverQueueUpdate, data.clone());
    }
}

pub fn driver_location(events: &dyn EventNotifier, driver: &Driver) {
    events.publish(
        Room::Admin,
        EventName::DriverLocationUpdate,
        json!({
            "driverId": driver.id,
            "location": driver.location,
        }),
    );
}
