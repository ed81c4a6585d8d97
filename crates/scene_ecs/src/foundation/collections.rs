//! Specialized collection types

use std::collections::HashMap;
use std::hash::Hash;

pub use slotmap::{SlotMap, new_key_type};

/// Multi-value map that keeps the values of each key in insertion order
///
/// Used for subscriber tables and the optional search indexes. A value is
/// stored at most once per key.
#[derive(Debug, Clone)]
pub struct LookupMap<K, V> {
    entries: HashMap<K, Vec<V>>,
}

impl<K: Eq + Hash, V: Copy + PartialEq> LookupMap<K, V> {
    /// Create an empty map
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Append `value` under `key`; returns false if it was already present
    pub fn insert(&mut self, key: K, value: V) -> bool {
        let values = self.entries.entry(key).or_default();
        if values.contains(&value) {
            return false;
        }
        values.push(value);
        true
    }

    /// Remove `value` from `key`; returns false if it wasn't there
    pub fn remove<Q>(&mut self, key: &Q, value: V) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let Some(values) = self.entries.get_mut(key) else {
            return false;
        };
        let before = values.len();
        values.retain(|v| *v != value);
        let removed = values.len() != before;
        if values.is_empty() {
            self.entries.remove(key);
        }
        removed
    }

    /// Remove `value` from every key it appears under
    pub fn remove_value(&mut self, value: V) {
        self.entries.retain(|_, values| {
            values.retain(|v| *v != value);
            !values.is_empty()
        });
    }

    /// All values stored under `key`, oldest first
    pub fn find_all<Q>(&self, key: &Q) -> &[V]
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.get(key).map_or(&[], Vec::as_slice)
    }

    /// The oldest value stored under `key`
    pub fn find_first<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.find_all(key).first().copied()
    }

    /// Whether `value` is stored under `key`
    pub fn contains<Q>(&self, key: &Q, value: V) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.find_all(key).contains(&value)
    }

    /// Number of keys holding at least one value
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<K: Eq + Hash, V: Copy + PartialEq> Default for LookupMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_map_keeps_insertion_order() {
        let mut map: LookupMap<String, u32> = LookupMap::new();
        assert!(map.insert("a".to_string(), 3));
        assert!(map.insert("a".to_string(), 1));
        assert!(!map.insert("a".to_string(), 3));
        map.insert("b".to_string(), 1);

        assert_eq!(map.find_all("a"), &[3, 1]);
        assert_eq!(map.find_first("b"), Some(1));
        assert!(map.find_all("c").is_empty());
    }

    #[test]
    fn test_lookup_map_removal() {
        let mut map: LookupMap<&'static str, u32> = LookupMap::new();
        map.insert("a", 1);
        map.insert("a", 2);
        map.insert("b", 1);

        assert!(map.remove("a", 2));
        assert!(!map.remove("a", 2));
        map.remove_value(1);

        assert_eq!(map.key_count(), 0);
        assert!(!map.contains("b", 1));
    }
}
