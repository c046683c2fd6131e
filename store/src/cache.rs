use std::{borrow::Borrow, collections::HashMap, hash::Hash};

use types::UnixMillis;

struct Entry<V> {
    value: V,
    expires_at: UnixMillis,
    last_access: UnixMillis,
}

/// Bounded map whose entries expire `ttl_ms` after insertion.
///
/// When full, expired entries are purged first and then the least recently
/// read entry is evicted. Time is passed in by the caller.
pub struct TtlCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    capacity: usize,
    ttl_ms: u64,
}

impl<K: Eq + Hash + Clone, V> TtlCache<K, V> {
    pub fn new(capacity: usize, ttl_ms: u64) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: capacity.max(1),
            ttl_ms,
        }
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    pub fn get<Q>(&mut self, key: &Q, now: UnixMillis) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.get_mut(key, now).map(|v| &*v)
    }

    pub fn get_mut<Q>(&mut self, key: &Q, now: UnixMillis) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let expired = self.entries.get(key)?.expires_at <= now;
        if expired {
            self.entries.remove(key);
            return None;
        }

        let entry = self.entries.get_mut(key)?;
        entry.last_access = now;
        Some(&mut entry.value)
    }

    pub fn insert(&mut self, key: K, value: V, now: UnixMillis) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.purge_expired(now);
            if self.entries.len() >= self.capacity {
                self.evict_least_recent();
            }
        }

        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: now.saturating_add(self.ttl_ms),
                last_access: now,
            },
        );
    }

    pub fn invalidate<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.entries.remove(key).map(|e| e.value)
    }

    /// Drops expired entries and returns how many were dropped.
    pub fn purge_expired(&mut self, now: UnixMillis) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_access)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}
