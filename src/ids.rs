//! External identifier allocation.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Hands out process-unique external ids.
///
/// DAP serializes ids as JSON numbers, which many clients handle as 64-bit
/// floats, so ids are kept within the positive signed 32-bit range. Ids are
/// monotonic and never reused for the lifetime of the session. One source is
/// created per session and shared by every allocating component.
#[derive(Debug, Clone)]
pub struct IdSource(Arc<AtomicI32>);

impl IdSource {
    pub fn new() -> Self {
        IdSource(Arc::new(AtomicI32::new(1)))
    }

    pub fn next_id(&self) -> i32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Bidirectional map between external ids and opaque internal keys.
#[derive(Debug)]
pub struct IdMap<K> {
    ids: IdSource,
    by_id: HashMap<i32, K>,
    by_key: HashMap<K, i32>,
}

impl<K: Eq + Hash + Clone> IdMap<K> {
    pub fn new(ids: IdSource) -> Self {
        IdMap {
            ids,
            by_id: HashMap::new(),
            by_key: HashMap::new(),
        }
    }

    /// Bind a fresh external id to `key`. The key must not be mapped yet.
    pub fn allocate(&mut self, key: K) -> i32 {
        debug_assert!(!self.by_key.contains_key(&key));
        let id = self.ids.next_id();
        self.by_id.insert(id, key.clone());
        self.by_key.insert(key, id);
        id
    }

    /// The id already bound to `key`, or a freshly allocated one.
    pub fn intern(&mut self, key: K) -> i32 {
        match self.by_key.get(&key) {
            Some(id) => *id,
            None => self.allocate(key),
        }
    }

    pub fn to_external(&self, key: &K) -> Option<i32> {
        self.by_key.get(key).copied()
    }

    pub fn to_internal(&self, id: i32) -> Option<&K> {
        self.by_id.get(&id)
    }

    pub fn remove_external(&mut self, id: i32) -> Option<K> {
        let key = self.by_id.remove(&id)?;
        self.by_key.remove(&key);
        Some(key)
    }

    pub fn remove_internal(&mut self, key: &K) -> Option<i32> {
        let id = self.by_key.remove(key)?;
        self.by_id.remove(&id);
        Some(id)
    }

    /// Drop every mapping whose id fails the predicate, returning the
    /// removed ids.
    pub fn retain(&mut self, mut keep: impl FnMut(i32, &K) -> bool) -> Vec<i32> {
        let mut dropped = Vec::new();
        let by_key = &mut self.by_key;
        self.by_id.retain(|id, key| {
            if keep(*id, key) {
                true
            } else {
                by_key.remove(key);
                dropped.push(*id);
                false
            }
        });
        dropped
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ids_are_monotonic_and_unique() {
        let ids = IdSource::new();
        let a = ids.next_id();
        let b = ids.next_id();
        assert!(b > a);
    }

    #[test]
    fn allocate_and_look_up_both_ways() {
        let mut map = IdMap::new(IdSource::new());
        let id = map.allocate("key");
        assert_eq!(map.to_internal(id), Some(&"key"));
        assert_eq!(map.to_external(&"key"), Some(id));
        assert_eq!(map.to_internal(id + 1), None);
    }

    #[test]
    fn intern_returns_the_same_id() {
        let mut map = IdMap::new(IdSource::new());
        let id = map.intern("key");
        assert_eq!(map.intern("key"), id);
        assert_ne!(map.intern("other"), id);
    }

    #[test]
    fn removed_ids_are_not_reallocated() {
        let mut map = IdMap::new(IdSource::new());
        let id = map.allocate("key");
        map.remove_external(id);
        assert_eq!(map.to_internal(id), None);
        let fresh = map.allocate("key");
        assert_ne!(fresh, id);
    }

    #[test]
    fn sources_share_the_counter() {
        let ids = IdSource::new();
        let mut threads = IdMap::new(ids.clone());
        let mut containers = IdMap::new(ids);
        let a = threads.allocate("t1");
        let b = containers.allocate("c1");
        assert_ne!(a, b);
    }
}
