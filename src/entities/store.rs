use crate::entities::record::AfkRecord;
use crate::world::host::EntityId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};
use std::time::Instant;

/// Shared slot for one identity: the record plus a guard that serialises
/// transitions for that identity.
#[derive(Debug)]
pub struct EntityEntry {
    record: Mutex<AfkRecord>,
    transition: Mutex<()>,
}

impl EntityEntry {
    fn new(record: AfkRecord) -> Self {
        Self {
            record: Mutex::new(record),
            transition: Mutex::new(()),
        }
    }

    /// Short critical section over the record. Never hold this across host calls.
    pub fn lock(&self) -> MutexGuard<'_, AfkRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `None` while another transition for this identity is running.
    pub fn try_begin_transition(&self) -> Option<MutexGuard<'_, ()>> {
        match self.transition.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Blocks until any running transition for this identity finishes.
    /// Only for callers that never run inside a transition, such as
    /// disconnect handling and shutdown.
    pub fn begin_transition(&self) -> MutexGuard<'_, ()> {
        self.transition.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> AfkRecord {
        self.lock().clone()
    }
}

/// Concurrent identity -> record map. Entries leave only on explicit removal.
#[derive(Debug, Default)]
pub struct EntityStore {
    entries: RwLock<HashMap<EntityId, Arc<EntityEntry>>>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: EntityId) -> Option<Arc<EntityEntry>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&id).cloned()
    }

    /// Concurrent callers racing on a new identity all get the same entry.
    pub fn get_or_create(&self, id: EntityId, now: Instant) -> Arc<EntityEntry> {
        if let Some(entry) = self.get(id) {
            return entry;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            entries
                .entry(id)
                .or_insert_with(|| Arc::new(EntityEntry::new(AfkRecord::new(id, now)))),
        )
    }

    pub fn remove(&self, id: EntityId) -> Option<Arc<EntityEntry>> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(&id)
    }

    /// Inserts a recovered record unless a live away record already exists.
    pub fn merge_recovered(&self, record: AfkRecord) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(&record.id) {
            Some(existing) => {
                let mut current = existing.lock();
                if current.is_away() {
                    return false;
                }
                *current = record;
                true
            }
            None => {
                entries.insert(record.id, Arc::new(EntityEntry::new(record)));
                true
            }
        }
    }

    pub fn ids(&self) -> Vec<EntityId> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.keys().copied().collect()
    }

    pub fn count_where(&self, predicate: impl Fn(&AfkRecord) -> bool) -> usize {
        self.entries_snapshot()
            .iter()
            .filter(|entry| predicate(&*entry.lock()))
            .count()
    }

    /// Point-in-time copies of every record.
    pub fn all(&self) -> Vec<AfkRecord> {
        self.entries_snapshot()
            .iter()
            .map(|entry| entry.snapshot())
            .collect()
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }

    // Copy the handles out so record locks are taken without the map lock.
    fn entries_snapshot(&self) -> Vec<Arc<EntityEntry>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.values().cloned().collect()
    }
}
