//! Driver work-queue mechanics. Everything here mutates a `Driver` value in
//! place and never touches storage, so callers can validate, mutate a
//! clone, and commit atomically.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::{Driver, DriverAvailability, QueueEntry};

/// Where an order ended up after being handed to a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Current,
    Queued,
}

/// Index of the queue head: lowest priority, ties broken by earliest assignment.
pub fn head_index(queue: &[QueueEntry]) -> Option<usize> {
    queue
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.assigned_at.cmp(&b.assigned_at))
        })
        .map(|(index, _)| index)
}

/// Appends the order to the queue; a free driver takes it straight away.
pub fn enqueue(
    driver: &mut Driver,
    order_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Placement, AppError> {
    if driver.availability == DriverAvailability::Offline {
        return Err(AppError::DriverOffline(driver.id));
    }
    if !driver.queue_has_room() {
        return Err(AppError::QueueFull {
            driver_id: driver.id,
            capacity: driver.max_queue_size,
        });
    }

    driver.queue.push(QueueEntry {
        order_id,
        assigned_at: now,
        priority: 0,
    });

    if driver.availability == DriverAvailability::Free {
        let entry = driver.queue.pop();
        driver.current_order = entry.map(|entry| entry.order_id);
        driver.availability = DriverAvailability::Busy;
        driver.updated_at = now;
        return Ok(Placement::Current);
    }

    driver.updated_at = now;
    Ok(Placement::Queued)
}

/// Promotes the queue head into the current slot, or idles the driver.
/// Returns the newly current order, if any.
pub fn advance(driver: &mut Driver, now: DateTime<Utc>) -> Option<Uuid> {
    driver.current_order = head_index(&driver.queue).map(|index| driver.queue.remove(index).order_id);
    driver.availability = if driver.current_order.is_some() {
        DriverAvailability::Busy
    } else {
        DriverAvailability::Free
    };
    driver.updated_at = now;
    driver.current_order
}

/// Unbinds an order from the driver, whether current or queued. Removing the
/// current order promotes the next head exactly like a completion would.
/// Returns whether the removed order was the current one.
pub fn detach(driver: &mut Driver, order_id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
    if driver.current_order == Some(order_id) {
        advance(driver, now);
        return Ok(true);
    }

    let position = driver
        .queue
        .iter()
        .position(|entry| entry.order_id == order_id)
        .ok_or(AppError::OrderNotFoundInQueue {
            order_id,
            driver_id: driver.id,
        })?;
    driver.queue.remove(position);
    driver.updated_at = now;
    Ok(false)
}

/// Rewrites priorities to match `ordered`, which must be a permutation of
/// the queued order ids. The current order is never part of the queue.
pub fn reorder(driver: &mut Driver, ordered: &[Uuid], now: DateTime<Utc>) -> Result<(), AppError> {
    if ordered.len() != driver.queue.len() {
        return Err(AppError::InvalidQueueOrder(format!(
            "expected {} order ids, got {}",
            driver.queue.len(),
            ordered.len()
        )));
    }

    let mut seen = HashSet::with_capacity(ordered.len());
    let mut reordered = Vec::with_capacity(ordered.len());
    for (index, order_id) in ordered.iter().enumerate() {
        if !seen.insert(*order_id) {
            return Err(AppError::InvalidQueueOrder(format!(
                "order {order_id} listed more than once"
            )));
        }

        let entry = driver
            .queue
            .iter()
            .find(|entry| entry.order_id == *order_id)
            .ok_or(AppError::OrderNotFoundInQueue {
                order_id: *order_id,
                driver_id: driver.id,
            })?;

        reordered.push(QueueEntry {
            priority: u32::try_from(index).unwrap_or(u32::MAX),
            ..entry.clone()
        });
    }

    driver.queue = reordered;
    driver.updated_at = now;
    Ok(())
}

/// Empties the driver's slots and returns every order that was bound.
pub fn clear(driver: &mut Driver, now: DateTime<Utc>) -> Vec<Uuid> {
    let released = driver.bound_orders();
    driver.current_order = None;
    driver.queue.clear();
    driver.updated_at = now;
    released
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::*;

    fn driver(availability: DriverAvailability, max_queue_size: u8) -> Driver {
        let now = Utc::now();
        Driver {
            id: Uuid::from_u128(100),
            name: "test-driver".to_string(),
            availability,
            current_order: None,
            queue: Vec::new(),
            max_queue_size,
            location: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn id(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn head_prefers_priority_then_age() {
        let t0 = Utc::now();
        let queue = vec![
            QueueEntry {
                order_id: id(1),
                assigned_at: t0,
                priority: 2,
            },
            QueueEntry {
                order_id: id(2),
                assigned_at: t0 + Duration::seconds(5),
                priority: 0,
            },
            QueueEntry {
                order_id: id(3),
                assigned_at: t0 + Duration::seconds(1),
                priority: 0,
            },
        ];

        assert_eq!(head_index(&queue), Some(2));
        assert_eq!(head_index(&[]), None);
    }

    #[test]
    fn free_driver_takes_order_immediately() {
        let mut d = driver(DriverAvailability::Free, 1);
        let placement = enqueue(&mut d, id(1), Utc::now()).unwrap();

        assert_eq!(placement, Placement::Current);
        assert_eq!(d.current_order, Some(id(1)));
        assert_eq!(d.availability, DriverAvailability::Busy);
        assert!(d.queue.is_empty());
    }

    #[test]
    fn busy_driver_queues_until_capacity() {
        let mut d = driver(DriverAvailability::Free, 2);
        let now = Utc::now();
        enqueue(&mut d, id(1), now).unwrap();
        assert_eq!(enqueue(&mut d, id(2), now).unwrap(), Placement::Queued);
        assert_eq!(enqueue(&mut d, id(3), now).unwrap(), Placement::Queued);

        let err = enqueue(&mut d, id(4), now).unwrap_err();
        assert!(matches!(err, AppError::QueueFull { capacity: 2, .. }));
        assert_eq!(d.current_order, Some(id(1)));
        assert_eq!(d.queue.len(), 2);
    }

    #[test]
    fn offline_driver_rejects_orders() {
        let mut d = driver(DriverAvailability::Offline, 3);
        let err = enqueue(&mut d, id(1), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::DriverOffline(_)));
        assert!(d.queue.is_empty());
    }

    #[test]
    fn advance_promotes_head_or_idles() {
        let mut d = driver(DriverAvailability::Free, 3);
        let t0 = Utc::now();
        enqueue(&mut d, id(1), t0).unwrap();
        enqueue(&mut d, id(2), t0 + Duration::seconds(1)).unwrap();
        enqueue(&mut d, id(3), t0 + Duration::seconds(2)).unwrap();

        assert_eq!(advance(&mut d, Utc::now()), Some(id(2)));
        assert_eq!(d.availability, DriverAvailability::Busy);
        assert_eq!(advance(&mut d, Utc::now()), Some(id(3)));
        assert_eq!(advance(&mut d, Utc::now()), None);
        assert_eq!(d.availability, DriverAvailability::Free);
        assert!(d.current_order.is_none());
    }

    #[test]
    fn reorder_changes_promotion_order() {
        let mut d = driver(DriverAvailability::Free, 3);
        let t0 = Utc::now();
        enqueue(&mut d, id(1), t0).unwrap();
        enqueue(&mut d, id(2), t0 + Duration::seconds(1)).unwrap();
        enqueue(&mut d, id(3), t0 + Duration::seconds(2)).unwrap();

        reorder(&mut d, &[id(3), id(2)], Utc::now()).unwrap();
        assert_eq!(d.current_order, Some(id(1)));
        assert_eq!(advance(&mut d, Utc::now()), Some(id(3)));
    }

    #[test]
    fn reorder_rejects_non_permutations_without_mutation() {
        let mut d = driver(DriverAvailability::Free, 3);
        let t0 = Utc::now();
        enqueue(&mut d, id(1), t0).unwrap();
        enqueue(&mut d, id(2), t0).unwrap();
        enqueue(&mut d, id(3), t0).unwrap();
        let before = d.queue.clone();

        let missing = reorder(&mut d, &[id(2)], Utc::now()).unwrap_err();
        assert!(matches!(missing, AppError::InvalidQueueOrder(_)));

        let duplicate = reorder(&mut d, &[id(2), id(2)], Utc::now()).unwrap_err();
        assert!(matches!(duplicate, AppError::InvalidQueueOrder(_)));

        let unknown = reorder(&mut d, &[id(2), id(9)], Utc::now()).unwrap_err();
        assert!(matches!(unknown, AppError::OrderNotFoundInQueue { .. }));

        assert_eq!(d.queue, before);
    }

    #[test]
    fn detach_current_promotes_next() {
        let mut d = driver(DriverAvailability::Free, 3);
        let t0 = Utc::now();
        enqueue(&mut d, id(1), t0).unwrap();
        enqueue(&mut d, id(2), t0).unwrap();

        assert!(detach(&mut d, id(1), Utc::now()).unwrap());
        assert_eq!(d.current_order, Some(id(2)));
        assert!(d.queue.is_empty());

        assert!(detach(&mut d, id(2), Utc::now()).unwrap());
        assert_eq!(d.availability, DriverAvailability::Free);

        let err = detach(&mut d, id(7), Utc::now()).unwrap_err();
        assert!(matches!(err, AppError::OrderNotFoundInQueue { .. }));
    }

    #[test]
    fn clear_releases_everything() {
        let mut d = driver(DriverAvailability::Free, 3);
        let t0 = Utc::now();
        enqueue(&mut d, id(1), t0).unwrap();
        enqueue(&mut d, id(2), t0).unwrap();

        let released = clear(&mut d, Utc::now());
        assert_eq!(released, vec![id(1), id(2)]);
        assert!(d.current_order.is_none());
        assert!(d.queue.is_empty());
    }
}
