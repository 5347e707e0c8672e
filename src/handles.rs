//! Thread-safe table assigning capture ids to driver handles.
//!
//! Driver handle values are opaque and may be reused by the driver after a
//! destroy call, so the capture layer never writes them to the stream
//! directly. Instead every live handle gets a process-unique id the first
//! time it is seen, and that id is what travels in call records. Releasing
//! a handle on destroy lets a recycled driver value get a fresh id.
//!
//! # Thread Safety
//!
//! The table uses `AtomicU64` for lock-free id generation and `DashMap`
//! for lock-free concurrent mapping storage, since handle wrapping happens
//! on whichever thread issues the API call.
//!
//! # ID Sequentiality
//!
//! Under concurrent access id values may not be strictly sequential (gaps
//! can occur when insertions race on the same key). Uniqueness is always
//! guaranteed, which is all the codec needs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::format::HandleId;

/// Initial capacity for the handle map. Sized for a typical application
/// without rehashing.
const INITIAL_HANDLE_CAPACITY: usize = 4096;

/// Concurrent raw-handle to capture-id table.
#[derive(Debug)]
pub struct HandleTable {
    /// Counter for generating sequential handle ids.
    next_id: AtomicU64,

    /// Mapping from raw driver handle value to capture id.
    raw_to_id: DashMap<u64, HandleId>,
}

impl HandleTable {
    /// Create a new table with ids starting at 1. Id 0 is reserved so a
    /// null driver handle can keep encoding as 0.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            raw_to_id: DashMap::with_capacity(INITIAL_HANDLE_CAPACITY),
        }
    }

    /// Get or create the capture id for a raw driver handle.
    ///
    /// A raw value of 0 is the null handle and always maps to id 0.
    /// Thread-safe via DashMap's internal sharded locking.
    pub fn get_or_assign(&self, raw: u64) -> HandleId {
        if raw == 0 {
            return 0;
        }
        // The entry API handles the get-or-insert atomically. Relaxed
        // ordering is sufficient, only uniqueness matters.
        *self
            .raw_to_id
            .entry(raw)
            .or_insert_with(|| self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the capture id for a raw handle if one was assigned, without
    /// creating a new one.
    pub fn lookup(&self, raw: u64) -> Option<HandleId> {
        if raw == 0 {
            return Some(0);
        }
        self.raw_to_id.get(&raw).map(|r| *r.value())
    }

    /// Drop the mapping for a destroyed handle, returning the id it had.
    /// The driver may recycle the raw value; the id is never reused.
    pub fn release(&self, raw: u64) -> Option<HandleId> {
        self.raw_to_id.remove(&raw).map(|(_, id)| id)
    }

    /// Number of live (non-null) handles currently tracked.
    pub fn len(&self) -> usize {
        self.raw_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw_to_id.is_empty()
    }

    /// Snapshot of the complete raw-to-id mapping.
    pub fn snapshot(&self) -> HashMap<u64, HandleId> {
        self.raw_to_id
            .iter()
            .map(|r| (*r.key(), *r.value()))
            .collect()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle_is_id_zero() {
        let table = HandleTable::new();
        assert_eq!(table.get_or_assign(0), 0);
        assert_eq!(table.lookup(0), Some(0));
        // The null handle is not tracked as a live handle.
        assert!(table.is_empty());
    }

    #[test]
    fn test_ids_are_stable_and_sequential() {
        let table = HandleTable::new();
        assert_eq!(table.get_or_assign(0xdead), 1);
        assert_eq!(table.get_or_assign(0xbeef), 2);
        // Looking up an existing handle returns the same id.
        assert_eq!(table.get_or_assign(0xdead), 1);
        assert_eq!(table.lookup(0xbeef), Some(2));
        assert_eq!(table.lookup(0xf00d), None);
    }

    #[test]
    fn test_release_allows_driver_to_recycle_raw_values() {
        let table = HandleTable::new();
        let first = table.get_or_assign(0x1000);
        assert_eq!(table.release(0x1000), Some(first));

        // Same raw value again: a new object, so a new id.
        let second = table.get_or_assign(0x1000);
        assert_ne!(first, second);
        assert_eq!(table.release(0xffff), None);
    }

    #[test]
    fn test_concurrent_assignment() {
        use std::sync::Arc;
        use std::thread;

        let table = Arc::new(HandleTable::new());
        let mut handles = vec![];

        // Multiple threads race to assign ids for the same raw handles.
        for _ in 0..10 {
            let table = Arc::clone(&table);
            handles.push(thread::spawn(move || {
                for raw in 1..=100u64 {
                    table.get_or_assign(raw);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let map = table.snapshot();
        assert_eq!(map.len(), 100);

        // Every raw handle got exactly one unique id.
        let mut ids: Vec<_> = map.values().copied().collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 100);
    }
}
