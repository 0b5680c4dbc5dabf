//! In-process record stores for drivers, orders, and the earnings ledger.
//!
//! Lock discipline: a driver lock is always taken before any order lock.
//! Writers read a clone under the relevant locks, mutate the clone, and
//! write it back only once every fallible step has succeeded.

pub mod ledger;
pub mod locks;

use dashmap::DashMap;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::Driver;
use crate::models::order::Order;

pub use ledger::EarningsLedger;
pub use locks::{KeyGuard, KeyedLocks};

pub struct Records {
    drivers: DashMap<Uuid, Driver>,
    orders: DashMap<Uuid, Order>,
    driver_locks: KeyedLocks,
    order_locks: KeyedLocks,
    lock_retry_limit: usize,
}

/// An order together with its bound driver, both held under lock.
pub struct OrderScope {
    pub order: Order,
    pub driver: Option<Driver>,
    _driver_guard: Option<KeyGuard>,
    _order_guard: KeyGuard,
}

impl Records {
    pub fn new(lock_retry_limit: usize) -> Self {
        Self {
            drivers: DashMap::new(),
            orders: DashMap::new(),
            driver_locks: KeyedLocks::new(),
            order_locks: KeyedLocks::new(),
            lock_retry_limit: lock_retry_limit.max(1),
        }
    }

    pub fn driver(&self, id: Uuid) -> Result<Driver, AppError> {
        self.drivers
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(AppError::DriverNotFound(id))
    }

    pub fn order(&self, id: Uuid) -> Result<Order, AppError> {
        self.orders
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(AppError::OrderNotFound(id))
    }

    pub fn put_driver(&self, driver: Driver) {
        self.drivers.insert(driver.id, driver);
    }

    pub fn put_order(&self, order: Order) {
        self.orders.insert(order.id, order);
    }

    pub fn drivers(&self) -> Vec<Driver> {
        self.drivers
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.orders
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    pub async fn lock_driver(&self, id: Uuid) -> KeyGuard {
        self.driver_locks.lock(id).await
    }

    pub async fn lock_order(&self, id: Uuid) -> KeyGuard {
        self.order_locks.lock(id).await
    }

    pub async fn lock_orders(&self, ids: &[Uuid]) -> Vec<KeyGuard> {
        self.order_locks.lock_many(ids).await
    }

    /// Locks an order and whichever driver it is bound to.
    ///
    /// The driver binding is read before locking, so the order is re-read
    /// under lock and the attempt repeated if the binding moved meanwhile.
    pub async fn lock_order_scope(&self, order_id: Uuid) -> Result<OrderScope, AppError> {
        for attempt in 1..=self.lock_retry_limit {
            let expected_driver = self.order(order_id)?.driver_id;

            let driver_guard = match expected_driver {
                Some(driver_id) => Some(self.lock_driver(driver_id).await),
                None => None,
            };
            let order_guard = self.lock_order(order_id).await;

            let order = self.order(order_id)?;
            if order.driver_id != expected_driver {
                warn!(order_id = %order_id, attempt, "driver binding changed while locking; retrying");
                continue;
            }

            let driver = match order.driver_id {
                Some(driver_id) => Some(self.driver(driver_id).map_err(|_| {
                    AppError::Internal(format!(
                        "order {order_id} references missing driver {driver_id}"
                    ))
                })?),
                None => None,
            };

            return Ok(OrderScope {
                order,
                driver,
                _driver_guard: driver_guard,
                _order_guard: order_guard,
            });
        }

        Err(AppError::Internal(format!(
            "could not lock order {order_id} after {} attempts",
            self.lock_retry_limit
        )))
    }
}
