//! Order status lifecycle: creation, validated transitions, cancellation,
//! and the delivery settlement shared with driver completion.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::engine::catalog::{self, ItemRequest};
use crate::engine::{earnings, events, instrumented, queue};
use crate::error::AppError;
use crate::models::actor::{Actor, Role};
use crate::models::driver::Driver;
use crate::models::earnings::EarningsRecord;
use crate::models::notification::NotificationKind;
use crate::models::order::{DeliveryAddress, Order, OrderPaymentMethod, OrderStatus};
use crate::notify::{EventNotifier, NotificationSink};
use crate::observability::metrics::Metrics;
use crate::store::{EarningsLedger, Records};

#[derive(Debug, Clone, Deserialize)]
pub struct NewOrder {
    pub items: Vec<ItemRequest>,
    pub delivery_address: DeliveryAddress,
    #[serde(default)]
    pub payment_method: Option<OrderPaymentMethod>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub driver_id: Option<Uuid>,
}

/// A delivered order ready to be written together with its driver and
/// earnings record.
pub(crate) struct Delivery {
    pub order: Order,
    pub driver: Driver,
    pub record: EarningsRecord,
}

/// Moves `order` one legal step to `to`, stamping delivery timestamps.
pub fn apply_transition(order: &mut Order, to: OrderStatus, now: DateTime<Utc>) -> Result<(), AppError> {
    if !order.status.can_transition_to(to) {
        return Err(AppError::InvalidTransition {
            from: order.status,
            to,
        });
    }

    order.status = to;
    order.updated_at = now;
    match to {
        OrderStatus::OutForDelivery if order.delivery_date.is_none() => {
            order.delivery_date = Some(now);
        }
        OrderStatus::Delivered => order.delivered_at = Some(now),
        _ => {}
    }
    Ok(())
}

/// Walks `order` forward hop by hop until it is delivered. Returns the
/// statuses entered on the way.
pub fn advance_to_delivered(order: &mut Order, now: DateTime<Utc>) -> Result<Vec<OrderStatus>, AppError> {
    if order.status.is_terminal() {
        return Err(AppError::InvalidTransition {
            from: order.status,
            to: OrderStatus::Delivered,
        });
    }

    let mut entered = Vec::new();
    while let Some(next) = order.status.next_towards_delivery() {
        apply_transition(order, next, now)?;
        entered.push(next);
    }
    Ok(entered)
}

/// Which statuses a cancellation may start from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelRule {
    /// The dedicated cancel action: anything not yet terminal.
    AnyOpenStatus,
    /// A plain status update: only edges in the transition table.
    TransitionTable,
}

#[derive(Clone)]
pub struct OrderLifecycle {
    records: Arc<Records>,
    ledger: Arc<EarningsLedger>,
    events: Arc<dyn EventNotifier>,
    notifications: Arc<dyn NotificationSink>,
    metrics: Metrics,
}

impl OrderLifecycle {
    pub fn new(
        records: Arc<Records>,
        ledger: Arc<EarningsLedger>,
        events: Arc<dyn EventNotifier>,
        notifications: Arc<dyn NotificationSink>,
        metrics: Metrics,
    ) -> Self {
        Self {
            records,
            ledger,
            events,
            notifications,
            metrics,
        }
    }

    pub async fn create_order(&self, actor: Actor, request: NewOrder) -> Result<Order, AppError> {
        instrumented(&self.metrics, "create_order", async {
            if actor.role != Role::Customer {
                return Err(AppError::AccessDenied(
                    "only customers can place orders".to_string(),
                ));
            }
            if request.delivery_address.address.trim().is_empty()
                || request.delivery_address.phone_number.trim().is_empty()
            {
                return Err(AppError::BadRequest(
                    "delivery address and phone number are required".to_string(),
                ));
            }

            let priced = catalog::price(&request.items)?;
            let now = Utc::now();
            let order = Order {
                id: Uuid::new_v4(),
                order_number: catalog::order_number(now),
                customer_id: actor.id,
                items: priced.items,
                subtotal: priced.subtotal,
                tax: priced.tax,
                total_amount: priced.total_amount,
                delivery_address: request.delivery_address,
                payment_method: request.payment_method.unwrap_or_default(),
                notes: request.notes,
                status: OrderStatus::Pending,
                driver_id: None,
                order_date: now,
                delivery_date: None,
                delivered_at: None,
                updated_at: now,
            };

            self.records.put_order(order.clone());
            events::new_order(self.events.as_ref(), &order);
            info!(
                order_id = %order.id,
                order_number = %order.order_number,
                customer_id = %actor.id,
                total_amount = order.total_amount,
                "order created"
            );
            Ok(order)
        })
        .await
    }

    pub fn get_order(&self, actor: Actor, order_id: Uuid) -> Result<Order, AppError> {
        let order = self.records.order(order_id)?;
        if !actor.may_touch_order(order.customer_id) {
            return Err(AppError::AccessDenied(
                "you can only view your own orders".to_string(),
            ));
        }
        Ok(order)
    }

    /// Customers see their own orders; staff see everything, filtered.
    pub fn list_orders(&self, actor: Actor, filter: &OrderFilter) -> Vec<Order> {
        let mut orders: Vec<Order> = self
            .records
            .orders()
            .into_iter()
            .filter(|order| actor.role != Role::Customer || order.customer_id == actor.id)
            .filter(|order| filter.status.is_none_or(|status| order.status == status))
            .filter(|order| filter.driver_id.is_none_or(|id| order.driver_id == Some(id)))
            .collect();
        orders.sort_by(|a, b| b.order_date.cmp(&a.order_date));
        orders
    }

    pub async fn update_status(
        &self,
        order_id: Uuid,
        status: OrderStatus,
        actor: Actor,
    ) -> Result<Order, AppError> {
        if status == OrderStatus::Cancelled {
            return self.cancel(order_id, actor, CancelRule::TransitionTable).await;
        }

        instrumented(&self.metrics, "update_status", async {
            let scope = self.records.lock_order_scope(order_id).await?;
            if !actor.may_touch_order(scope.order.customer_id) {
                return Err(AppError::AccessDenied(
                    "you can only update your own orders".to_string(),
                ));
            }

            let now = Utc::now();
            let mut order = scope.order.clone();
            apply_transition(&mut order, status, now)?;

            if status != OrderStatus::Delivered {
                self.records.put_order(order.clone());
                self.metrics.record_transition(status);
                events::order_status(self.events.as_ref(), &order, actor.id);
                info!(order_id = %order_id, from = %scope.order.status, to = %status, "order status updated");
                return Ok(order);
            }

            let mut driver = scope.driver.clone().ok_or(AppError::OrderNotAssigned(order_id))?;
            let record = self.settle_delivery(&order, &mut driver, now)?;
            let delivery = Delivery {
                order,
                driver,
                record,
            };
            self.commit_delivery(&delivery)?;
            self.announce_delivery(&delivery, &[OrderStatus::Delivered], actor.id);
            Ok(delivery.order)
        })
        .await
    }

    /// Cancels a non-terminal order and frees the driver slot it occupied.
    pub async fn cancel_order(&self, order_id: Uuid, actor: Actor) -> Result<Order, AppError> {
        self.cancel(order_id, actor, CancelRule::AnyOpenStatus).await
    }

    async fn cancel(&self, order_id: Uuid, actor: Actor, rule: CancelRule) -> Result<Order, AppError> {
        instrumented(&self.metrics, "cancel_order", async {
            let scope = self.records.lock_order_scope(order_id).await?;
            if !actor.may_touch_order(scope.order.customer_id) {
                return Err(AppError::AccessDenied(
                    "you can only cancel your own orders".to_string(),
                ));
            }
            let allowed = match rule {
                CancelRule::AnyOpenStatus => !scope.order.status.is_terminal(),
                CancelRule::TransitionTable => {
                    scope.order.status.can_transition_to(OrderStatus::Cancelled)
                }
            };
            if !allowed {
                return Err(AppError::InvalidTransition {
                    from: scope.order.status,
                    to: OrderStatus::Cancelled,
                });
            }

            let now = Utc::now();
            let mut order = scope.order.clone();
            order.status = OrderStatus::Cancelled;
            order.driver_id = None;
            order.updated_at = now;

            let released = match scope.driver.clone() {
                Some(mut driver) => {
                    queue::detach(&mut driver, order_id, now).map_err(|_| {
                        AppError::Internal(format!(
                            "order {order_id} points at driver {} which does not hold it",
                            driver.id
                        ))
                    })?;
                    Some(driver)
                }
                None => None,
            };

            if let Some(driver) = &released {
                self.records.put_driver(driver.clone());
            }
            self.records.put_order(order.clone());

            self.metrics.record_transition(OrderStatus::Cancelled);
            events::order_status(self.events.as_ref(), &order, actor.id);
            if let Some(driver) = &released {
                self.metrics.record_queue(driver);
                events::driver_queue(self.events.as_ref(), driver);
                events::driver_status(self.events.as_ref(), driver);
                self.notifications.notify(
                    driver.id,
                    NotificationKind::OrderCancelled,
                    json!({
                        "orderId": order.id,
                        "orderNumber": order.order_number,
                    }),
                );
            }

            info!(
                order_id = %order_id,
                released_driver = ?released.as_ref().map(|driver| driver.id),
                "order cancelled"
            );
            Ok(order)
        })
        .await
    }

    /// Builds the earnings record and releases the driver's slot for a
    /// delivered order. Nothing is written; see [`Self::commit_delivery`].
    pub(crate) fn settle_delivery(
        &self,
        order: &Order,
        driver: &mut Driver,
        now: DateTime<Utc>,
    ) -> Result<EarningsRecord, AppError> {
        if self.ledger.has_order(order.id) {
            return Err(AppError::EarningsAlreadyExist(order.id));
        }

        let record = earnings::record_for(order, driver.id, now)?;
        queue::detach(driver, order.id, now).map_err(|_| {
            AppError::Internal(format!(
                "driver {} does not hold delivered order {}",
                driver.id, order.id
            ))
        })?;
        Ok(record)
    }

    /// Writes a settled delivery. The ledger append is the only step that
    /// can fail, so it goes first.
    pub(crate) fn commit_delivery(&self, delivery: &Delivery) -> Result<(), AppError> {
        self.ledger.append(delivery.record.clone())?;
        self.records.put_order(delivery.order.clone());
        self.records.put_driver(delivery.driver.clone());
        Ok(())
    }

    pub(crate) fn announce_delivery(&self, delivery: &Delivery, entered: &[OrderStatus], actor_id: Uuid) {
        let Delivery {
            order,
            driver,
            record,
        } = delivery;

        for status in entered {
            self.metrics.record_transition(*status);
        }
        self.metrics.earnings_records_total.inc();
        self.metrics.record_queue(driver);

        events::order_status(self.events.as_ref(), order, actor_id);
        events::driver_status(self.events.as_ref(), driver);
        events::driver_queue(self.events.as_ref(), driver);

        self.notifications.notify(
            driver.id,
            NotificationKind::PaymentReceived,
            json!({
                "title": "Payment Received",
                "amount": record.total_earned,
                "orderNumber": record.order_number,
            }),
        );

        info!(
            order_id = %order.id,
            driver_id = %driver.id,
            earnings_id = %record.id,
            total_earned = record.total_earned,
            next_order = ?driver.current_order,
            "order delivered"
        );
    }
}
