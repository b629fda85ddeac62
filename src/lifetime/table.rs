//! Wrapper table: (type, pointer) -> counted weak handle

use std::any::TypeId;
use std::collections::HashMap;

use crate::abi::RefId;

/// Cache key of a wrapped native object.
///
/// Only identifies objects of non-zero size; see [`Capabilities::cacheable`](super::Capabilities::cacheable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WrapKey {
    pub type_id: TypeId,
    pub address: usize,
}

impl WrapKey {
    pub fn of<T: 'static>(ptr: *const T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            address: ptr as usize,
        }
    }
}

/// One tracked pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapEntry {
    /// Host objects created for this key whose finalizer has not run.
    pub count: u32,
    /// Weak handle to the newest host object.
    pub weak: RefId,
    /// Whether lookups may reuse the newest host object.
    pub cached: bool,
}

/// Pointer bookkeeping shared by every wrap of a runtime instance.
///
/// Holds only reference ids; the caller performs every host call so no
/// borrow of the table is ever held across one.
#[derive(Debug, Default)]
pub struct WrapperTable {
    entries: HashMap<WrapKey, WrapEntry>,
}

impl WrapperTable {
    pub fn get(&self, key: &WrapKey) -> Option<WrapEntry> {
        self.entries.get(key).copied()
    }

    /// Weak handle usable for reuse, if the newest wrapper is cached.
    pub fn lookup(&self, key: &WrapKey) -> Option<RefId> {
        self.entries
            .get(key)
            .filter(|entry| entry.cached)
            .map(|entry| entry.weak)
    }

    /// Record a new host object for `key`.
    ///
    /// Returns the weak handle it replaces, which the caller must delete.
    pub fn add(&mut self, key: WrapKey, weak: RefId, cached: bool) -> Option<RefId> {
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.count += 1;
                entry.cached = cached;
                Some(std::mem::replace(&mut entry.weak, weak))
            }
            None => {
                self.entries.insert(
                    key,
                    WrapEntry {
                        count: 1,
                        weak,
                        cached,
                    },
                );
                None
            }
        }
    }

    /// One host object for `key` was finalized.
    ///
    /// Returns the entry's weak handle once the last one is gone.
    ///
    /// # Panics
    ///
    /// If `key` is not tracked: every finalizer pairs with one `add`.
    pub fn release(&mut self, key: &WrapKey) -> Option<RefId> {
        let Some(entry) = self.entries.get_mut(key) else {
            panic!("finalizing untracked wrapper {key:?}");
        };
        entry.count -= 1;
        if entry.count > 0 {
            return None;
        }
        self.entries.remove(key).map(|entry| entry.weak)
    }

    pub fn count(&self, key: &WrapKey) -> u32 {
        self.entries.get(key).map_or(0, |entry| entry.count)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every entry, returning their weak handles.
    pub fn drain(&mut self) -> Vec<RefId> {
        self.entries.drain().map(|(_, entry)| entry.weak).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(address: usize) -> WrapKey {
        WrapKey {
            type_id: TypeId::of::<u32>(),
            address,
        }
    }

    #[test]
    fn test_add_counts_and_replaces_handle() {
        let mut table = WrapperTable::default();
        assert_eq!(table.add(key(8), RefId(1), true), None);
        assert_eq!(table.add(key(8), RefId(2), true), Some(RefId(1)));
        assert_eq!(table.count(&key(8)), 2);
        assert_eq!(table.lookup(&key(8)), Some(RefId(2)));
    }

    #[test]
    fn test_release_removes_at_zero() {
        let mut table = WrapperTable::default();
        table.add(key(8), RefId(1), true);
        table.add(key(8), RefId(2), true);
        table.add(key(8), RefId(3), true);

        assert_eq!(table.release(&key(8)), None);
        assert_eq!(table.release(&key(8)), None);
        assert_eq!(table.count(&key(8)), 1);
        assert_eq!(table.release(&key(8)), Some(RefId(3)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_uncached_entries_are_not_reused() {
        let mut table = WrapperTable::default();
        table.add(key(16), RefId(4), false);
        assert_eq!(table.lookup(&key(16)), None);
        assert_eq!(table.count(&key(16)), 1);
    }

    #[test]
    fn test_keys_differ_by_type() {
        let mut table = WrapperTable::default();
        let other = WrapKey {
            type_id: TypeId::of::<u64>(),
            address: 8,
        };
        table.add(key(8), RefId(1), true);
        assert_eq!(table.lookup(&other), None);
    }

    #[test]
    #[should_panic(expected = "untracked wrapper")]
    fn test_release_untracked_panics() {
        let mut table = WrapperTable::default();
        table.release(&key(32));
    }
}
