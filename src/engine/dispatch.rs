//! Driver dispatch: binding orders to drivers, advancing the current-order
//! pointer, and admin queue maintenance.
//!
//! Every operation on a driver runs under that driver's lock, and any order
//! it touches is locked afterwards, so assignments, completions, reorders
//! and removals against one driver never interleave.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::engine::lifecycle::{self, Delivery, OrderLifecycle};
use crate::engine::queue::{self, Placement};
use crate::engine::{events, instrumented};
use crate::error::AppError;
use crate::models::actor::Actor;
use crate::models::driver::{
    Driver, DriverAvailability, GeoPoint, Location, MAX_QUEUE_SIZE, MIN_QUEUE_SIZE,
};
use crate::models::notification::NotificationKind;
use crate::models::order::Order;
use crate::notify::{EventNotifier, NotificationSink};
use crate::observability::metrics::Metrics;
use crate::store::Records;

#[derive(Debug, Clone, Deserialize)]
pub struct NewDriver {
    pub name: String,
    #[serde(default)]
    pub max_queue_size: Option<u8>,
    #[serde(default)]
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Assignment {
    pub order: Order,
    pub driver: Driver,
    pub placement: Placement,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverPage {
    pub drivers: Vec<Driver>,
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DriverStatistics {
    pub total: usize,
    pub free: usize,
    pub busy: usize,
    pub offline: usize,
}

fn check_queue_size(size: u8) -> Result<u8, AppError> {
    if !(MIN_QUEUE_SIZE..=MAX_QUEUE_SIZE).contains(&size) {
        return Err(AppError::BadRequest(format!(
            "max queue size must be between {MIN_QUEUE_SIZE} and {MAX_QUEUE_SIZE}, got {size}"
        )));
    }
    Ok(size)
}

fn check_point(point: GeoPoint) -> Result<GeoPoint, AppError> {
    if !point.is_valid() {
        return Err(AppError::BadRequest(format!(
            "location out of range: ({}, {})",
            point.latitude, point.longitude
        )));
    }
    Ok(point)
}

#[derive(Clone)]
pub struct DispatchEngine {
    records: Arc<Records>,
    lifecycle: OrderLifecycle,
    events: Arc<dyn EventNotifier>,
    notifications: Arc<dyn NotificationSink>,
    metrics: Metrics,
    default_max_queue_size: u8,
}

impl DispatchEngine {
    pub fn new(
        records: Arc<Records>,
        lifecycle: OrderLifecycle,
        events: Arc<dyn EventNotifier>,
        notifications: Arc<dyn NotificationSink>,
        metrics: Metrics,
        default_max_queue_size: u8,
    ) -> Self {
        Self {
            records,
            lifecycle,
            events,
            notifications,
            metrics,
            default_max_queue_size,
        }
    }

    pub fn register_driver(&self, request: NewDriver) -> Result<Driver, AppError> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("name cannot be empty".to_string()));
        }

        let max_queue_size =
            check_queue_size(request.max_queue_size.unwrap_or(self.default_max_queue_size))?;
        let now = Utc::now();
        let location = request
            .location
            .map(check_point)
            .transpose()?
            .map(|point| Location::at(point, now));

        let driver = Driver {
            id: Uuid::new_v4(),
            name: name.to_string(),
            availability: DriverAvailability::Offline,
            current_order: None,
            queue: Vec::new(),
            max_queue_size,
            location,
            created_at: now,
            updated_at: now,
        };

        self.records.put_driver(driver.clone());
        self.metrics.record_queue(&driver);
        info!(driver_id = %driver.id, max_queue_size, "driver registered");
        Ok(driver)
    }

    pub fn get_driver(&self, driver_id: Uuid) -> Result<Driver, AppError> {
        self.records.driver(driver_id)
    }

    pub fn list_drivers(
        &self,
        availability: Option<DriverAvailability>,
        page: usize,
        limit: usize,
    ) -> DriverPage {
        let page = page.max(1);
        let limit = limit.clamp(1, 100);

        let mut drivers: Vec<Driver> = self
            .records
            .drivers()
            .into_iter()
            .filter(|driver| availability.is_none_or(|wanted| driver.availability == wanted))
            .collect();
        drivers.sort_by(|a, b| {
            a.availability
                .as_str()
                .cmp(b.availability.as_str())
                .then_with(|| b.queue.len().cmp(&a.queue.len()))
                .then_with(|| a.created_at.cmp(&b.created_at))
        });

        let total = drivers.len();
        let drivers = drivers
            .into_iter()
            .skip((page - 1) * limit)
            .take(limit)
            .collect();

        DriverPage {
            drivers,
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit),
        }
    }

    pub fn statistics(&self) -> DriverStatistics {
        self.records
            .drivers()
            .iter()
            .fold(DriverStatistics::default(), |mut stats, driver| {
                stats.total += 1;
                match driver.availability {
                    DriverAvailability::Free => stats.free += 1,
                    DriverAvailability::Busy => stats.busy += 1,
                    DriverAvailability::Offline => stats.offline += 1,
                }
                stats
            })
    }

    /// Binds an order to a driver. A free driver takes it as the current
    /// order straight away; a busy one queues it.
    pub async fn assign_order(&self, order_id: Uuid, driver_id: Uuid) -> Result<Assignment, AppError> {
        instrumented(&self.metrics, "assign_order", async {
            self.records.order(order_id)?;
            self.records.driver(driver_id)?;

            let _driver_guard = self.records.lock_driver(driver_id).await;
            let _order_guard = self.records.lock_order(order_id).await;

            let mut order = self.records.order(order_id)?;
            let mut driver = self.records.driver(driver_id)?;

            if let Some(bound_to) = order.driver_id {
                return Err(AppError::AlreadyAssigned {
                    order_id,
                    driver_id: bound_to,
                });
            }
            if order.status.is_terminal() {
                return Err(AppError::BadRequest(format!(
                    "order {order_id} is {} and cannot be dispatched",
                    order.status
                )));
            }

            let now = Utc::now();
            let placement = queue::enqueue(&mut driver, order_id, now)?;
            order.driver_id = Some(driver_id);
            order.updated_at = now;

            self.records.put_order(order.clone());
            self.records.put_driver(driver.clone());

            self.metrics.record_queue(&driver);
            events::order_assignment(self.events.as_ref(), &order, &driver);
            events::driver_queue(self.events.as_ref(), &driver);
            if placement == Placement::Current {
                events::driver_status(self.events.as_ref(), &driver);
            }
            self.notifications.notify(
                driver_id,
                NotificationKind::OrderAssigned,
                json!({
                    "orderId": order.id,
                    "orderNumber": order.order_number,
                    "placement": placement,
                }),
            );

            info!(
                order_id = %order_id,
                driver_id = %driver_id,
                placement = ?placement,
                queue_length = driver.queue.len(),
                "order assigned"
            );
            Ok(Assignment {
                order,
                driver,
                placement,
            })
        })
        .await
    }

    /// Delivers the driver's current order and promotes the queue head.
    pub async fn complete_current_order(&self, driver_id: Uuid, actor: Actor) -> Result<Driver, AppError> {
        instrumented(&self.metrics, "complete_current_order", async {
            let _driver_guard = self.records.lock_driver(driver_id).await;
            let mut driver = self.records.driver(driver_id)?;
            let order_id = driver
                .current_order
                .ok_or(AppError::NoCurrentOrder(driver_id))?;

            let _order_guard = self.records.lock_order(order_id).await;
            let mut order = self.records.order(order_id).map_err(|_| {
                AppError::Internal(format!(
                    "driver {driver_id} current order {order_id} is missing"
                ))
            })?;
            if order.driver_id != Some(driver_id) {
                return Err(AppError::Internal(format!(
                    "order {order_id} is not bound to driver {driver_id}"
                )));
            }

            let now = Utc::now();
            let entered = lifecycle::advance_to_delivered(&mut order, now)?;
            let record = self.lifecycle.settle_delivery(&order, &mut driver, now)?;
            let delivery = Delivery {
                order,
                driver,
                record,
            };
            self.lifecycle.commit_delivery(&delivery)?;
            self.lifecycle.announce_delivery(&delivery, &entered, actor.id);

            Ok(delivery.driver)
        })
        .await
    }

    /// Rewrites queue priorities to follow `ordered`. The whole list must be
    /// a permutation of the queued orders or nothing changes.
    pub async fn reorder_queue(&self, driver_id: Uuid, ordered: &[Uuid]) -> Result<Driver, AppError> {
        instrumented(&self.metrics, "reorder_queue", async {
            let _driver_guard = self.records.lock_driver(driver_id).await;
            let mut driver = self.records.driver(driver_id)?;

            queue::reorder(&mut driver, ordered, Utc::now())?;
            self.records.put_driver(driver.clone());

            events::driver_queue(self.events.as_ref(), &driver);
            info!(driver_id = %driver_id, queue_length = driver.queue.len(), "driver queue reordered");
            Ok(driver)
        })
        .await
    }

    /// Unassigns an order from the driver without delivering it.
    pub async fn remove_from_queue(&self, driver_id: Uuid, order_id: Uuid) -> Result<Driver, AppError> {
        instrumented(&self.metrics, "remove_from_queue", async {
            let _driver_guard = self.records.lock_driver(driver_id).await;
            let mut driver = self.records.driver(driver_id)?;
            if !driver.holds(order_id) {
                return Err(AppError::OrderNotFoundInQueue {
                    order_id,
                    driver_id,
                });
            }

            let _order_guard = self.records.lock_order(order_id).await;
            let mut order = self.records.order(order_id)?;

            let now = Utc::now();
            let was_current = queue::detach(&mut driver, order_id, now)?;
            order.driver_id = None;
            order.updated_at = now;

            self.records.put_driver(driver.clone());
            self.records.put_order(order.clone());

            self.metrics.record_queue(&driver);
            events::driver_queue(self.events.as_ref(), &driver);
            events::driver_status(self.events.as_ref(), &driver);
            events::order_status(self.events.as_ref(), &order, driver_id);

            info!(
                order_id = %order_id,
                driver_id = %driver_id,
                was_current,
                next_order = ?driver.current_order,
                "order removed from driver"
            );
            Ok(driver)
        })
        .await
    }

    /// Changes a driver's availability. Going offline unassigns every order
    /// the driver held; `busy` and `free` must agree with the current order.
    pub async fn set_availability(
        &self,
        driver_id: Uuid,
        availability: DriverAvailability,
        location: Option<GeoPoint>,
    ) -> Result<Driver, AppError> {
        instrumented(&self.metrics, "set_availability", async {
            let location = location.map(check_point).transpose()?;

            let _driver_guard = self.records.lock_driver(driver_id).await;
            let mut driver = self.records.driver(driver_id)?;
            let now = Utc::now();

            let mut released = Vec::new();
            match availability {
                DriverAvailability::Busy if driver.current_order.is_none() => {
                    return Err(AppError::InvalidAvailability(
                        "a driver becomes busy only by taking an order".to_string(),
                    ));
                }
                DriverAvailability::Free if driver.current_order.is_some() => {
                    return Err(AppError::InvalidAvailability(
                        "driver still has an order in progress".to_string(),
                    ));
                }
                DriverAvailability::Offline => {
                    released = queue::clear(&mut driver, now);
                }
                DriverAvailability::Busy | DriverAvailability::Free => {}
            }
            driver.availability = availability;
            driver.updated_at = now;
            if let Some(point) = location {
                driver.location = Some(Location::at(point, now));
            }

            let _order_guards = self.records.lock_orders(&released).await;
            let mut unassigned = Vec::with_capacity(released.len());
            for order_id in &released {
                let mut order = self.records.order(*order_id).map_err(|_| {
                    AppError::Internal(format!(
                        "driver {driver_id} held missing order {order_id}"
                    ))
                })?;
                if order.driver_id == Some(driver_id) {
                    order.driver_id = None;
                    order.updated_at = now;
                }
                unassigned.push(order);
            }

            for order in &unassigned {
                self.records.put_order(order.clone());
            }
            self.records.put_driver(driver.clone());

            self.metrics.record_queue(&driver);
            events::driver_status(self.events.as_ref(), &driver);
            if location.is_some() {
                events::driver_location(self.events.as_ref(), &driver);
            }
            if !unassigned.is_empty() {
                events::driver_queue(self.events.as_ref(), &driver);
            }
            for order in &unassigned {
                events::order_status(self.events.as_ref(), order, driver_id);
                self.notifications.notify(
                    order.customer_id,
                    NotificationKind::SystemUpdate,
                    json!({
                        "title": "Driver unavailable",
                        "orderId": order.id,
                        "orderNumber": order.order_number,
                    }),
                );
            }

            info!(
                driver_id = %driver_id,
                availability = availability.as_str(),
                unassigned = unassigned.len(),
                "driver availability updated"
            );
            Ok(driver)
        })
        .await
    }

    pub async fn update_location(&self, driver_id: Uuid, point: GeoPoint) -> Result<Driver, AppError> {
        instrumented(&self.metrics, "update_location", async {
            let point = check_point(point)?;

            let _driver_guard = self.records.lock_driver(driver_id).await;
            let mut driver = self.records.driver(driver_id)?;
            let now = Utc::now();
            driver.location = Some(Location::at(point, now));
            driver.updated_at = now;
            self.records.put_driver(driver.clone());

            events::driver_location(self.events.as_ref(), &driver);
            Ok(driver)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::models::actor::Role;
    use crate::models::event::{EventName, Room};
    use crate::models::order::{DeliveryAddress, OrderPaymentMethod, OrderStatus};
    use crate::notify::{BroadcastNotifier, NotificationInbox};
    use crate::store::EarningsLedger;

    struct Harness {
        engine: DispatchEngine,
        records: Arc<Records>,
        ledger: Arc<EarningsLedger>,
        events: BroadcastNotifier,
        inbox: Arc<NotificationInbox>,
    }

    fn harness() -> Harness {
        let records = Arc::new(Records::new(4));
        let ledger = Arc::new(EarningsLedger::new());
        let events = BroadcastNotifier::new(256);
        let inbox = Arc::new(NotificationInbox::new());
        let metrics = Metrics::new();
        let lifecycle = OrderLifecycle::new(
            records.clone(),
            ledger.clone(),
            Arc::new(events.clone()),
            inbox.clone(),
            metrics.clone(),
        );
        let engine = DispatchEngine::new(
            records.clone(),
            lifecycle,
            Arc::new(events.clone()),
            inbox.clone(),
            metrics,
            5,
        );
        Harness {
            engine,
            records,
            ledger,
            events,
            inbox,
        }
    }

    fn admin() -> Actor {
        Actor::new(Uuid::from_u128(1), Role::Admin)
    }

    impl Harness {
        async fn free_driver(&self, max_queue_size: u8) -> Driver {
            let driver = self
                .engine
                .register_driver(NewDriver {
                    name: "Driver".to_string(),
                    max_queue_size: Some(max_queue_size),
                    location: None,
                })
                .unwrap();
            self.engine
                .set_availability(driver.id, DriverAvailability::Free, None)
                .await
                .unwrap()
        }

        fn order(&self, total: f64) -> Order {
            let now = Utc::now();
            let order = Order {
                id: Uuid::new_v4(),
                order_number: format!("ORD-{}", now.timestamp_nanos_opt().unwrap_or_default()),
                customer_id: Uuid::new_v4(),
                items: Vec::new(),
                subtotal: total,
                tax: 0.0,
                total_amount: total,
                delivery_address: DeliveryAddress {
                    full_name: "C".to_string(),
                    house_number: "1".to_string(),
                    address: "Road".to_string(),
                    phone_number: "123".to_string(),
                    special_instructions: None,
                },
                payment_method: OrderPaymentMethod::Cash,
                notes: None,
                status: OrderStatus::Pending,
                driver_id: None,
                order_date: now,
                delivery_date: None,
                delivered_at: None,
                updated_at: now,
            };
            self.records.put_order(order.clone());
            order
        }
    }

    #[tokio::test]
    async fn capacity_one_scenario() {
        let h = harness();
        let d = h.free_driver(1).await;
        let o1 = h.order(1000.0);
        let o2 = h.order(500.0);
        let o3 = h.order(250.0);

        let first = h.engine.assign_order(o1.id, d.id).await.unwrap();
        assert_eq!(first.placement, Placement::Current);
        assert_eq!(first.driver.current_order, Some(o1.id));
        assert_eq!(first.driver.availability, DriverAvailability::Busy);
        assert!(first.driver.queue.is_empty());

        let second = h.engine.assign_order(o2.id, d.id).await.unwrap();
        assert_eq!(second.placement, Placement::Queued);
        assert_eq!(second.driver.current_order, Some(o1.id));
        assert_eq!(second.driver.queue.len(), 1);
        assert_eq!(second.driver.queue[0].order_id, o2.id);

        let err = h.engine.assign_order(o3.id, d.id).await.unwrap_err();
        assert!(matches!(err, AppError::QueueFull { capacity: 1, .. }));
        assert!(h.records.order(o3.id).unwrap().driver_id.is_none());

        let after = h.engine.complete_current_order(d.id, admin()).await.unwrap();
        assert_eq!(after.current_order, Some(o2.id));
        assert!(after.queue.is_empty());
        assert_eq!(after.availability, DriverAvailability::Busy);

        let delivered = h.records.order(o1.id).unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);
        let record = h.ledger.for_order(o1.id).unwrap();
        assert_eq!(record.base_amount, 800.0);
        assert_eq!(record.total_earned, 800.0);
    }

    #[tokio::test]
    async fn completing_twice_reports_no_current_order() {
        let h = harness();
        let d = h.free_driver(2).await;
        let o = h.order(300.0);
        h.engine.assign_order(o.id, d.id).await.unwrap();

        let idle = h.engine.complete_current_order(d.id, admin()).await.unwrap();
        assert_eq!(idle.availability, DriverAvailability::Free);
        assert!(idle.current_order.is_none());

        let err = h.engine.complete_current_order(d.id, admin()).await.unwrap_err();
        assert!(matches!(err, AppError::NoCurrentOrder(id) if id == d.id));
        assert_eq!(h.ledger.len(), 1);
    }

    #[tokio::test]
    async fn assignment_preconditions() {
        let h = harness();
        let d = h.free_driver(3).await;
        let o = h.order(100.0);

        let missing_order = h.engine.assign_order(Uuid::new_v4(), d.id).await.unwrap_err();
        assert!(matches!(missing_order, AppError::OrderNotFound(_)));

        let missing_driver = h.engine.assign_order(o.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(missing_driver, AppError::DriverNotFound(_)));

        h.engine.assign_order(o.id, d.id).await.unwrap();
        let again = h.engine.assign_order(o.id, d.id).await.unwrap_err();
        assert!(matches!(again, AppError::AlreadyAssigned { driver_id, .. } if driver_id == d.id));

        let other = h.free_driver(3).await;
        let elsewhere = h.engine.assign_order(o.id, other.id).await.unwrap_err();
        assert!(matches!(elsewhere, AppError::AlreadyAssigned { driver_id, .. } if driver_id == d.id));

        let offline = h
            .engine
            .register_driver(NewDriver {
                name: "Offline".to_string(),
                max_queue_size: None,
                location: None,
            })
            .unwrap();
        let o2 = h.order(100.0);
        let err = h.engine.assign_order(o2.id, offline.id).await.unwrap_err();
        assert!(matches!(err, AppError::DriverOffline(_)));
    }

    #[tokio::test]
    async fn busy_driver_appends_without_touching_current() {
        let h = harness();
        let d = h.free_driver(3).await;
        let o1 = h.order(100.0);
        let o2 = h.order(100.0);
        let o3 = h.order(100.0);

        h.engine.assign_order(o1.id, d.id).await.unwrap();
        h.engine.assign_order(o2.id, d.id).await.unwrap();
        let third = h.engine.assign_order(o3.id, d.id).await.unwrap();

        assert_eq!(third.driver.current_order, Some(o1.id));
        let queued: Vec<Uuid> = third.driver.queue.iter().map(|e| e.order_id).collect();
        assert_eq!(queued, vec![o2.id, o3.id]);
    }

    #[tokio::test]
    async fn reorder_then_complete_follows_new_order() {
        let h = harness();
        let d = h.free_driver(3).await;
        let o1 = h.order(100.0);
        let o2 = h.order(100.0);
        let o3 = h.order(100.0);
        for o in [&o1, &o2, &o3] {
            h.engine.assign_order(o.id, d.id).await.unwrap();
        }

        let reordered = h.engine.reorder_queue(d.id, &[o3.id, o2.id]).await.unwrap();
        assert_eq!(reordered.current_order, Some(o1.id));

        let after = h.engine.complete_current_order(d.id, admin()).await.unwrap();
        assert_eq!(after.current_order, Some(o3.id));
    }

    #[tokio::test]
    async fn partial_reorder_leaves_queue_unchanged() {
        let h = harness();
        let d = h.free_driver(3).await;
        let o1 = h.order(100.0);
        let o2 = h.order(100.0);
        let o3 = h.order(100.0);
        for o in [&o1, &o2, &o3] {
            h.engine.assign_order(o.id, d.id).await.unwrap();
        }
        let before = h.records.driver(d.id).unwrap().queue;

        let err = h.engine.reorder_queue(d.id, &[o3.id]).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidQueueOrder(_)));
        assert_eq!(h.records.driver(d.id).unwrap().queue, before);
    }

    #[tokio::test]
    async fn removing_current_order_promotes_without_earnings() {
        let h = harness();
        let d = h.free_driver(3).await;
        let o1 = h.order(100.0);
        let o2 = h.order(100.0);
        h.engine.assign_order(o1.id, d.id).await.unwrap();
        h.engine.assign_order(o2.id, d.id).await.unwrap();

        let after = h.engine.remove_from_queue(d.id, o1.id).await.unwrap();
        assert_eq!(after.current_order, Some(o2.id));
        assert!(after.queue.is_empty());

        let removed = h.records.order(o1.id).unwrap();
        assert!(removed.driver_id.is_none());
        assert_eq!(removed.status, OrderStatus::Pending);
        assert!(h.ledger.is_empty());

        let err = h.engine.remove_from_queue(d.id, o1.id).await.unwrap_err();
        assert!(matches!(err, AppError::OrderNotFoundInQueue { .. }));

        let idle = h.engine.remove_from_queue(d.id, o2.id).await.unwrap();
        assert_eq!(idle.availability, DriverAvailability::Free);
    }

    #[tokio::test]
    async fn going_offline_unassigns_everything() {
        let h = harness();
        let d = h.free_driver(3).await;
        let o1 = h.order(100.0);
        let o2 = h.order(100.0);
        h.engine.assign_order(o1.id, d.id).await.unwrap();
        h.engine.assign_order(o2.id, d.id).await.unwrap();

        let offline = h
            .engine
            .set_availability(d.id, DriverAvailability::Offline, None)
            .await
            .unwrap();
        assert!(offline.current_order.is_none());
        assert!(offline.queue.is_empty());
        assert!(h.records.order(o1.id).unwrap().driver_id.is_none());
        assert!(h.records.order(o2.id).unwrap().driver_id.is_none());

        let customer_notes = h.inbox.for_recipient(o1.customer_id);
        assert_eq!(customer_notes.len(), 1);
        assert_eq!(customer_notes[0].kind, NotificationKind::SystemUpdate);

        // Released orders can be dispatched again.
        let other = h.free_driver(3).await;
        h.engine.assign_order(o1.id, other.id).await.unwrap();
    }

    #[tokio::test]
    async fn availability_must_agree_with_current_order() {
        let h = harness();
        let d = h.free_driver(3).await;

        let err = h
            .engine
            .set_availability(d.id, DriverAvailability::Busy, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidAvailability(_)));

        let o = h.order(100.0);
        h.engine.assign_order(o.id, d.id).await.unwrap();
        let err = h
            .engine
            .set_availability(d.id, DriverAvailability::Free, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidAvailability(_)));
    }

    #[tokio::test]
    async fn location_updates_are_validated_and_published() {
        let h = harness();
        let d = h.free_driver(3).await;
        let mut rx = h.events.subscribe();

        let bad = h
            .engine
            .update_location(
                d.id,
                GeoPoint {
                    latitude: 91.0,
                    longitude: 0.0,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(bad, AppError::BadRequest(_)));

        let moved = h
            .engine
            .update_location(
                d.id,
                GeoPoint {
                    latitude: 24.86,
                    longitude: 67.0,
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.location.unwrap().latitude, 24.86);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event, EventName::DriverLocationUpdate);
    }

    #[tokio::test]
    async fn assignment_notifies_admin_and_driver_rooms() {
        let h = harness();
        let d = h.free_driver(3).await;
        let o = h.order(100.0);
        let mut rx = h.events.subscribe();

        h.engine.assign_order(o.id, d.id).await.unwrap();

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push((event.event, event.room));
        }
        assert!(names.contains(&(EventName::OrderAssignment, Room::Admin)));
        assert!(names.contains(&(EventName::OrderAssignment, Room::Driver(d.id))));
        assert!(names.contains(&(EventName::DriverQueueUpdate, Room::Driver(d.id))));
        assert!(names.contains(&(EventName::DriverStatusUpdate, Room::Admin)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_assignments_respect_capacity() {
        let h = harness();
        let d = h.free_driver(3).await;
        let orders: Vec<Order> = (0..20).map(|_| h.order(100.0)).collect();

        let mut handles = Vec::new();
        for order in &orders {
            let engine = h.engine.clone();
            let order_id = order.id;
            let driver_id = d.id;
            handles.push(tokio::spawn(async move {
                engine.assign_order(order_id, driver_id).await
            }));
        }

        let mut accepted = 0;
        let mut full = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(AppError::QueueFull { .. }) => full += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        // One current order plus a full queue of three.
        assert_eq!(accepted, 4);
        assert_eq!(full, 16);

        let driver = h.records.driver(d.id).unwrap();
        assert_eq!(driver.queue.len(), 3);
        let bound = orders
            .iter()
            .filter(|o| h.records.order(o.id).unwrap().driver_id == Some(d.id))
            .count();
        assert_eq!(bound, 4);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn completion_racing_cancellation_settles_once() {
        let h = harness();
        let d = h.free_driver(3).await;
        let o = h.order(1000.0);
        h.engine.assign_order(o.id, d.id).await.unwrap();

        let complete = {
            let engine = h.engine.clone();
            tokio::spawn(async move { engine.complete_current_order(d.id, admin()).await })
        };
        let cancel = {
            let lifecycle = h.engine.lifecycle.clone();
            tokio::spawn(async move { lifecycle.cancel_order(o.id, admin()).await })
        };

        let completed = complete.await.unwrap();
        let cancelled = cancel.await.unwrap();
        assert!(completed.is_ok() != cancelled.is_ok());

        let order = h.records.order(o.id).unwrap();
        let driver = h.records.driver(d.id).unwrap();
        assert!(driver.current_order.is_none());
        assert_eq!(driver.availability, DriverAvailability::Free);
        match order.status {
            OrderStatus::Delivered => assert_eq!(h.ledger.len(), 1),
            OrderStatus::Cancelled => assert!(h.ledger.is_empty()),
            other => panic!("unexpected status {other}"),
        }
    }
}
