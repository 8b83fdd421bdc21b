use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::SizeEstimate;

/// Hard bounds for a [`BoundedCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
  pub max_entries: usize,
  pub max_size_bytes: usize,
}

impl CacheLimits {
  pub fn new(max_entries: usize, max_size_bytes: usize) -> Self {
    Self {
      max_entries,
      max_size_bytes,
    }
  }
}

/// Outcome of [`BoundedCache::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutResult {
  /// The entry was stored; `evicted` older entries were dropped to make room.
  Inserted { evicted: usize },
  /// The entry alone exceeds the size ceiling (or the cache holds no entries at all).
  /// Nothing was inserted and any previous value under the key was removed.
  Rejected { size_bytes: usize, max_size_bytes: usize },
}

impl PutResult {
  pub fn is_inserted(&self) -> bool {
    matches!(self, PutResult::Inserted { .. })
  }

  /// Number of entries evicted by this put (zero when rejected).
  pub fn evicted(&self) -> usize {
    match self {
      PutResult::Inserted { evicted } => *evicted,
      PutResult::Rejected { .. } => 0,
    }
  }
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
  pub count: usize,
  pub total_size_bytes: usize,
  pub hits: u64,
  pub misses: u64,
  pub evictions: u64,
  pub rejections: u64,
}

struct Entry<V> {
  value: V,
  /// Fixed at insertion, never recomputed.
  size_bytes: usize,
  last_access: u64,
}

struct Inner<K, V> {
  entries: HashMap<K, Entry<V>>,
  /// last_access tick -> key. The first element is always the LRU entry.
  order: BTreeMap<u64, K>,
  total_size_bytes: usize,
  tick: u64,
  hits: u64,
  misses: u64,
  evictions: u64,
  rejections: u64,
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
  fn next_tick(&mut self) -> u64 {
    self.tick += 1;
    self.tick
  }

  fn remove(&mut self, key: &K) -> Option<Entry<V>> {
    let entry = self.entries.remove(key)?;
    self.order.remove(&entry.last_access);
    self.total_size_bytes -= entry.size_bytes;
    Some(entry)
  }

  fn evict_until_within(&mut self, limits: CacheLimits) -> usize {
    let mut evicted = 0;
    while self.entries.len() > limits.max_entries || self.total_size_bytes > limits.max_size_bytes {
      let Some((_, key)) = self.order.pop_first() else {
        break;
      };
      if let Some(entry) = self.entries.remove(&key) {
        self.total_size_bytes -= entry.size_bytes;
        evicted += 1;
      }
    }
    self.evictions += evicted as u64;
    evicted
  }
}

/// Thread-safe LRU cache bounded by entry count and total size.
///
/// All reads and writes go through one critical section, so no caller ever
/// observes `total_size_bytes` disagreeing with the live entries.
pub struct BoundedCache<K, V> {
  limits: CacheLimits,
  inner: Mutex<Inner<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedCache<K, V> {
  pub fn new(limits: CacheLimits) -> Self {
    Self {
      limits,
      inner: Mutex::new(Inner {
        entries: HashMap::new(),
        order: BTreeMap::new(),
        total_size_bytes: 0,
        tick: 0,
        hits: 0,
        misses: 0,
        evictions: 0,
        rejections: 0,
      }),
    }
  }

  pub fn limits(&self) -> CacheLimits {
    self.limits
  }

  // Every mutation restores the invariants before releasing the guard,
  // so the state behind a poisoned lock is still consistent.
  fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Look up a key, marking it most-recently-used on a hit.
  pub fn get(&self, key: &K) -> Option<V> {
    let mut inner = self.lock();
    let tick = inner.next_tick();
    let Some(entry) = inner.entries.get_mut(key) else {
      inner.misses += 1;
      return None;
    };
    let previous = std::mem::replace(&mut entry.last_access, tick);
    let value = entry.value.clone();
    inner.order.remove(&previous);
    inner.order.insert(tick, key.clone());
    inner.hits += 1;
    Some(value)
  }

  /// Check for a key without touching its recency.
  pub fn contains(&self, key: &K) -> bool {
    self.lock().entries.contains_key(key)
  }

  /// Insert or replace an entry whose size was estimated by the caller.
  ///
  /// The entry becomes most-recently-used, then LRU entries are evicted until
  /// both bounds hold again.
  pub fn put(&self, key: K, value: V, size_bytes: usize) -> PutResult {
    let limits = self.limits;
    let mut inner = self.lock();

    if limits.max_entries == 0 || size_bytes > limits.max_size_bytes {
      inner.remove(&key);
      inner.rejections += 1;
      debug!(size_bytes, max_size_bytes = limits.max_size_bytes, "Rejected oversized cache entry");
      return PutResult::Rejected {
        size_bytes,
        max_size_bytes: limits.max_size_bytes,
      };
    }

    inner.remove(&key);
    let tick = inner.next_tick();
    inner.order.insert(tick, key.clone());
    inner.entries.insert(
      key,
      Entry {
        value,
        size_bytes,
        last_access: tick,
      },
    );
    inner.total_size_bytes += size_bytes;

    let evicted = inner.evict_until_within(limits);
    if evicted > 0 {
      trace!(evicted, total_size_bytes = inner.total_size_bytes, "Evicted cache entries");
    }
    PutResult::Inserted { evicted }
  }

  /// Remove an entry, returning its value.
  pub fn remove(&self, key: &K) -> Option<V> {
    self.lock().remove(key).map(|e| e.value)
  }

  pub fn clear(&self) {
    let mut inner = self.lock();
    inner.entries.clear();
    inner.order.clear();
    inner.total_size_bytes = 0;
  }

  pub fn len(&self) -> usize {
    self.lock().entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn stats(&self) -> CacheStats {
    let inner = self.lock();
    CacheStats {
      count: inner.entries.len(),
      total_size_bytes: inner.total_size_bytes,
      hits: inner.hits,
      misses: inner.misses,
      evictions: inner.evictions,
      rejections: inner.rejections,
    }
  }

  /// All entries as `(key, value, size_bytes)`, least-recently-used first.
  ///
  /// Re-inserting the snapshot in order into an empty cache reproduces the
  /// same recency order.
  pub fn snapshot(&self) -> Vec<(K, V, usize)> {
    let inner = self.lock();
    inner
      .order
      .values()
      .filter_map(|key| {
        inner
          .entries
          .get(key)
          .map(|e| (key.clone(), e.value.clone(), e.size_bytes))
      })
      .collect()
  }

  /// Verify the internal bookkeeping. Returns a description of the first violation.
  pub fn check_invariants(&self) -> Result<(), String> {
    let inner = self.lock();
    let sum: usize = inner.entries.values().map(|e| e.size_bytes).sum();
    if sum != inner.total_size_bytes {
      return Err(format!("total_size_bytes {} != sum of entries {}", inner.total_size_bytes, sum));
    }
    if inner.entries.len() > self.limits.max_entries {
      return Err(format!("{} entries exceeds max {}", inner.entries.len(), self.limits.max_entries));
    }
    if inner.total_size_bytes > self.limits.max_size_bytes {
      return Err(format!(
        "{} bytes exceeds max {}",
        inner.total_size_bytes, self.limits.max_size_bytes
      ));
    }
    if inner.order.len() != inner.entries.len() {
      return Err(format!(
        "order index has {} keys for {} entries",
        inner.order.len(),
        inner.entries.len()
      ));
    }
    for (tick, key) in &inner.order {
      match inner.entries.get(key) {
        Some(entry) if entry.last_access == *tick => {}
        _ => return Err(format!("order index entry at tick {tick} is stale")),
      }
    }
    Ok(())
  }
}

impl<K, V> BoundedCache<K, V>
where
  K: Eq + Hash + Clone + SizeEstimate,
  V: Clone + SizeEstimate,
{
  /// Insert with the size derived structurally from key and value.
  pub fn put_estimated(&self, key: K, value: V) -> PutResult {
    let size = key.estimated_size() + value.estimated_size();
    self.put(key, value, size)
  }
}
