use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::earnings::EarningsRecord;
use crate::store::{KeyGuard, KeyedLocks};

/// Append-only earnings records with a unique index on the order id.
#[derive(Default)]
pub struct EarningsLedger {
    records: DashMap<Uuid, EarningsRecord>,
    by_order: DashMap<Uuid, Uuid>,
    record_locks: KeyedLocks,
}

impl EarningsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_order(&self, order_id: Uuid) -> bool {
        self.by_order.contains_key(&order_id)
    }

    /// Appends a record; a second record for the same order is refused.
    pub fn append(&self, record: EarningsRecord) -> Result<(), AppError> {
        match self.by_order.entry(record.order_id) {
            Entry::Occupied(_) => Err(AppError::EarningsAlreadyExist(record.order_id)),
            Entry::Vacant(slot) => {
                slot.insert(record.id);
                self.records.insert(record.id, record);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: Uuid) -> Result<EarningsRecord, AppError> {
        self.records
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(AppError::EarningsNotFound(id))
    }

    pub fn for_order(&self, order_id: Uuid) -> Option<EarningsRecord> {
        let record_id = *self.by_order.get(&order_id)?;
        self.records.get(&record_id).map(|entry| entry.value().clone())
    }

    /// A driver's records, newest first.
    pub fn for_driver(&self, driver_id: Uuid) -> Vec<EarningsRecord> {
        let mut records: Vec<EarningsRecord> = self
            .records
            .iter()
            .filter(|entry| entry.value().driver_id == driver_id)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Replaces an existing record. Callers hold the record lock.
    pub fn update(&self, record: EarningsRecord) -> Result<(), AppError> {
        match self.records.get_mut(&record.id) {
            Some(mut existing) => {
                if existing.order_id != record.order_id {
                    return Err(AppError::Internal(format!(
                        "earnings record {} cannot move between orders",
                        record.id
                    )));
                }
                *existing = record;
                Ok(())
            }
            None => Err(AppError::EarningsNotFound(record.id)),
        }
    }

    pub async fn lock(&self, id: Uuid) -> KeyGuard {
        self.record_locks.lock(id).await
    }

    pub async fn lock_many(&self, ids: &[Uuid]) -> Vec<KeyGuard> {
        self.record_locks.lock_many(ids).await
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
