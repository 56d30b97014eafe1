//! Specialized collection types

use slotmap::{Key, SlotMap};
use thiserror::Error;

pub use slotmap::new_key_type;

/// Returned when a fixed-capacity pool has no free slot left.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("pool is full ({capacity} slots)")]
pub struct PoolFull {
    /// Capacity the pool was created with
    pub capacity: usize,
}

/// Fixed-capacity arena addressed by generational handles.
///
/// Removing an element returns its slot to the free list. The next insert may
/// reuse the slot, but with a bumped generation, so handles to the removed
/// element stop resolving instead of aliasing the new one.
pub struct Pool<K: Key, T> {
    slots: SlotMap<K, T>,
    capacity: usize,
}

impl<K: Key, T> Pool<K, T> {
    /// Create an empty pool that holds at most `capacity` live elements.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: SlotMap::with_capacity_and_key(capacity),
            capacity,
        }
    }

    /// Insert an element and return its handle.
    pub fn insert(&mut self, value: T) -> Result<K, PoolFull> {
        if self.slots.len() >= self.capacity {
            return Err(PoolFull { capacity: self.capacity });
        }
        Ok(self.slots.insert(value))
    }

    /// Remove an element, freeing its slot.
    pub fn remove(&mut self, key: K) -> Option<T> {
        self.slots.remove(key)
    }

    /// Get an element by handle
    pub fn get(&self, key: K) -> Option<&T> {
        self.slots.get(key)
    }

    /// Get a mutable element by handle
    pub fn get_mut(&mut self, key: K) -> Option<&mut T> {
        self.slots.get_mut(key)
    }

    /// Whether the handle still resolves
    pub fn contains(&self, key: K) -> bool {
        self.slots.contains_key(key)
    }

    /// Number of live elements
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the pool holds no elements
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Maximum number of live elements
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every element. All outstanding handles become invalid.
    pub fn reset(&mut self) {
        self.slots.clear();
    }

    /// Iterate live elements with their handles
    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.slots.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    new_key_type! {
        struct TestKey;
    }

    #[test]
    fn test_pool_respects_capacity() {
        let mut pool: Pool<TestKey, u32> = Pool::with_capacity(2);

        assert!(pool.insert(1).is_ok());
        assert!(pool.insert(2).is_ok());
        assert_eq!(pool.insert(3), Err(PoolFull { capacity: 2 }));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_freed_slot_is_reused_with_new_generation() {
        let mut pool: Pool<TestKey, &str> = Pool::with_capacity(1);

        let first = pool.insert("first").unwrap();
        assert_eq!(pool.remove(first), Some("first"));

        let second = pool.insert("second").unwrap();
        assert_ne!(first, second);
        assert_eq!(pool.get(first), None);
        assert_eq!(pool.get(second), Some(&"second"));
    }

    #[test]
    fn test_reset_invalidates_handles() {
        let mut pool: Pool<TestKey, u32> = Pool::with_capacity(4);
        let key = pool.insert(7).unwrap();

        pool.reset();

        assert!(!pool.contains(key));
        assert!(pool.is_empty());
    }
}
