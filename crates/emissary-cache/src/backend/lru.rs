//! Bounded store with exact least-recently-used eviction.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use indexmap::IndexMap;

/// Result of an insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Insertion {
    /// Key assigned to the new value.
    pub key: u64,
    /// Key of the entry dropped to make room, if any.
    pub evicted: Option<u64>,
}

#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    touched: u64,
}

/// Fixed-capacity store keyed by a monotonically increasing counter.
///
/// Iteration follows insertion order of the resident entries. Eviction
/// follows recency: both [`insert`](Self::insert) and [`get`](Self::get)
/// count as a touch, and the least recently touched entry is dropped when
/// an insertion would exceed the capacity.
///
/// Keys start at 1 and are never reused, not even after eviction or
/// [`clear`](Self::clear).
///
/// # Example
///
/// ```
/// use std::num::NonZeroUsize;
/// use emissary_cache::LruStore;
///
/// let mut store = LruStore::new(NonZeroUsize::new(2).unwrap());
/// let a = store.insert("a").key;
/// store.insert("b");
/// store.get(a);
/// let c = store.insert("c");
///
/// assert_eq!(c.evicted, Some(2));
/// assert_eq!(store.values().collect::<Vec<_>>(), vec![&"a", &"c"]);
/// ```
#[derive(Debug, Clone)]
pub struct LruStore<V> {
    capacity: NonZeroUsize,
    entries: IndexMap<u64, Slot<V>>,
    // touch tick -> key, oldest first
    recency: BTreeMap<u64, u64>,
    next_key: u64,
    clock: u64,
}

impl<V> LruStore<V> {
    /// Creates an empty store holding at most `capacity` entries.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            entries: IndexMap::with_capacity(capacity.get()),
            recency: BTreeMap::new(),
            next_key: 1,
            clock: 0,
        }
    }

    /// Inserts `value` under a fresh key, evicting the least recently touched
    /// entry if the store is full.
    pub fn insert(&mut self, value: V) -> Insertion {
        let key = self.next_key;
        self.next_key += 1;

        let touched = self.tick();
        self.entries.insert(key, Slot { value, touched });
        self.recency.insert(touched, key);

        let evicted = if self.entries.len() > self.capacity.get() {
            self.evict_oldest()
        } else {
            None
        };

        Insertion { key, evicted }
    }

    /// Returns the value for `key`, marking it as most recently used.
    pub fn get(&mut self, key: u64) -> Option<&V> {
        let touched = self.tick();
        let slot = self.entries.get_mut(&key)?;
        self.recency.remove(&slot.touched);
        slot.touched = touched;
        self.recency.insert(touched, key);
        Some(&slot.value)
    }

    /// Returns the value for `key` without touching it.
    pub fn peek(&self, key: u64) -> Option<&V> {
        self.entries.get(&key).map(|slot| &slot.value)
    }

    /// Values in insertion order. Does not touch any entry.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values().map(|slot| &slot.value)
    }

    /// Key/value pairs in insertion order. Does not touch any entry.
    pub fn entries(&self) -> impl Iterator<Item = (u64, &V)> {
        self.entries.iter().map(|(key, slot)| (*key, &slot.value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    /// Removes every entry. The key counter keeps running.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn evict_oldest(&mut self) -> Option<u64> {
        let (_, key) = self.recency.pop_first()?;
        self.entries.shift_remove(&key);
        Some(key)
    }
}
