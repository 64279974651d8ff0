//! Fixed-capacity map with insertion-order eviction.
//!
//! Capacity is enforced on every insert: the map never holds more than
//! `capacity` entries, and the entry evicted is always the one inserted (or
//! re-inserted) longest ago.

use crate::error::{OverlayError, Result};
use std::borrow::Borrow;
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct BoundedMap<K, V> {
    entries: HashMap<K, V>,
    order: VecDeque<K>,
    capacity: usize,
}

impl<K, V> BoundedMap<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(OverlayError::InvalidCapacity);
        }
        Ok(Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        })
    }

    /// Insert or replace `key`, returning the evicted entry if the map was full.
    ///
    /// Replacing an existing key moves it to the newest position and never evicts.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        if self.entries.insert(key.clone(), value).is_some() {
            self.unlink(&key);
            self.order.push_back(key);
            return None;
        }

        self.order.push_back(key);
        if self.entries.len() <= self.capacity {
            return None;
        }

        let oldest = self.order.pop_front()?;
        let value = self.entries.remove(&oldest)?;
        Some((oldest, value))
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get_mut(key)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let value = self.entries.remove(key)?;
        if let Some(pos) = self.order.iter().position(|k| <K as Borrow<Q>>::borrow(k) == key) {
            self.order.remove(pos);
        }
        Some(value)
    }

    /// Key that would be evicted next.
    pub fn oldest(&self) -> Option<&K> {
        self.order.front()
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key).map(|value| (key, value)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn unlink(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_rejected() {
        assert_eq!(
            BoundedMap::<u32, u32>::new(0).unwrap_err(),
            OverlayError::InvalidCapacity
        );
    }

    #[test]
    fn evicts_oldest_insertion() {
        let mut map = BoundedMap::new(2).unwrap();
        assert!(map.insert("a", 1).is_none());
        assert!(map.insert("b", 2).is_none());
        assert_eq!(map.insert("c", 3), Some(("a", 1)));
        assert_eq!(map.len(), 2);
        assert!(!map.contains_key("a"));
        assert_eq!(map.oldest(), Some(&"b"));
    }

    #[test]
    fn reinsert_refreshes_position_without_evicting() {
        let mut map = BoundedMap::new(2).unwrap();
        map.insert("a", 1);
        map.insert("b", 2);
        assert!(map.insert("a", 10).is_none());
        assert_eq!(map.get("a"), Some(&10));
        assert_eq!(map.insert("c", 3), Some(("b", 2)));
        let keys: Vec<_> = map.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[test]
    fn remove_keeps_order_consistent() {
        let mut map = BoundedMap::new(3).unwrap();
        map.insert(1, "x");
        map.insert(2, "y");
        map.insert(3, "z");
        assert_eq!(map.remove(&2), Some("y"));
        map.insert(4, "w");
        assert_eq!(map.insert(5, "v"), Some((1, "x")));
        assert_eq!(map.oldest(), Some(&3));
    }
}
