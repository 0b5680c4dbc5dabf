use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

type LockMap = DashMap<Uuid, Arc<Mutex<()>>>;

/// One async mutex per record id. Holding the guard serialises every writer
/// of that record; distinct ids never contend. An id's entry is dropped
/// once nobody holds or waits on it.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Arc<LockMap>,
}

/// Exclusive hold on one key; releases and possibly evicts on drop.
pub struct KeyGuard {
    key: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Waiters clone the Arc under the shard lock, so a count of one
        // here means only the map still refers to the mutex.
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: Uuid) -> KeyGuard {
        let mutex = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        KeyGuard {
            key,
            guard: Some(mutex.lock_owned().await),
            locks: self.locks.clone(),
        }
    }

    /// Locks several keys in ascending id order so two callers with
    /// overlapping sets cannot deadlock.
    pub async fn lock_many(&self, keys: &[Uuid]) -> Vec<KeyGuard> {
        let mut sorted = keys.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for key in sorted {
            guards.push(self.lock(key).await);
        }
        guards
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
