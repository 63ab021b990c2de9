//! Cache storage trait and in-memory implementation.
//!
//! Every write carries a sequence number. A key remembers the number of the
//! last write, invalidation or removal that touched it (its floor) and rejects
//! writes at or below it, so results from reads that started earlier can never
//! replace newer data. Once no such read is left the floor is pruned.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::key::{CacheKey, KeyPattern};

/// A single cached value.
#[derive(Debug, Clone)]
pub struct CachedValue {
  /// The cached payload, as serialized JSON
  pub value: Value,
  /// When the value was written
  pub cached_at: DateTime<Utc>,
  /// Set by invalidation; the next read must refetch
  pub invalidated: bool,
}

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Get the value stored under `key`.
  fn lookup(&self, key: &CacheKey) -> Option<CachedValue>;

  /// Store `value` under `key` if `seq` is above the key's floor.
  /// Returns whether the value was stored.
  fn write(&self, key: &CacheKey, value: Value, seq: u64) -> bool;

  /// Mark every matching entry invalidated and raise its floor to `seq`.
  fn invalidate(&self, pattern: &KeyPattern, seq: u64) -> Vec<CacheKey>;

  /// Evict every matching entry and raise its floor to `seq`.
  fn remove(&self, pattern: &KeyPattern, seq: u64) -> Vec<CacheKey>;

  /// Raise the floor of one key without touching its value.
  fn raise_floor(&self, key: &CacheKey, seq: u64);

  /// Forget the floor of one key. Only sound once no write numbered below
  /// the floor can still arrive for it.
  fn prune_floor(&self, key: &CacheKey);

  /// Drop everything; no write numbered at or below `seq` is accepted afterwards.
  fn clear(&self, seq: u64);
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn lookup(&self, _key: &CacheKey) -> Option<CachedValue> {
    None // Always miss
  }

  fn write(&self, _key: &CacheKey, _value: Value, _seq: u64) -> bool {
    false // Discard
  }

  fn invalidate(&self, _pattern: &KeyPattern, _seq: u64) -> Vec<CacheKey> {
    Vec::new()
  }

  fn remove(&self, _pattern: &KeyPattern, _seq: u64) -> Vec<CacheKey> {
    Vec::new()
  }

  fn raise_floor(&self, _key: &CacheKey, _seq: u64) {}

  fn prune_floor(&self, _key: &CacheKey) {}

  fn clear(&self, _seq: u64) {}
}

#[derive(Default)]
struct Inner {
  entries: HashMap<CacheKey, CachedValue>,
  /// Outlives the entry so removed keys still reject late writes; pruned once
  /// the key has no reads in flight
  floors: HashMap<CacheKey, u64>,
  global_floor: u64,
}

impl Inner {
  fn floor(&self, key: &CacheKey) -> u64 {
    self
      .floors
      .get(key)
      .copied()
      .unwrap_or(0)
      .max(self.global_floor)
  }

  fn raise(&mut self, key: &CacheKey, seq: u64) {
    let floor = self.floors.entry(key.clone()).or_insert(0);
    *floor = (*floor).max(seq);
  }
}

/// Process-wide in-memory cache storage.
#[derive(Default)]
pub struct MemoryStorage {
  inner: Mutex<Inner>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    // Entries are plain data; a panic elsewhere cannot leave them half-written.
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }

  #[cfg(test)]
  pub(crate) fn tracked_floors(&self) -> usize {
    self.lock().floors.len()
  }
}

impl CacheStorage for MemoryStorage {
  fn lookup(&self, key: &CacheKey) -> Option<CachedValue> {
    self.lock().entries.get(key).cloned()
  }

  fn write(&self, key: &CacheKey, value: Value, seq: u64) -> bool {
    let mut inner = self.lock();
    if seq <= inner.floor(key) {
      return false;
    }
    inner.raise(key, seq);
    inner.entries.insert(
      key.clone(),
      CachedValue {
        value,
        cached_at: Utc::now(),
        invalidated: false,
      },
    );
    true
  }

  fn invalidate(&self, pattern: &KeyPattern, seq: u64) -> Vec<CacheKey> {
    let mut inner = self.lock();
    let keys: Vec<CacheKey> = inner
      .entries
      .keys()
      .filter(|k| pattern.matches(k))
      .cloned()
      .collect();
    for key in &keys {
      inner.raise(key, seq);
      if let Some(entry) = inner.entries.get_mut(key) {
        entry.invalidated = true;
      }
    }
    keys
  }

  fn remove(&self, pattern: &KeyPattern, seq: u64) -> Vec<CacheKey> {
    let mut inner = self.lock();
    let keys: Vec<CacheKey> = inner
      .entries
      .keys()
      .filter(|k| pattern.matches(k))
      .cloned()
      .collect();
    for key in &keys {
      inner.raise(key, seq);
      inner.entries.remove(key);
    }
    keys
  }

  fn raise_floor(&self, key: &CacheKey, seq: u64) {
    self.lock().raise(key, seq);
  }

  fn prune_floor(&self, key: &CacheKey) {
    self.lock().floors.remove(key);
  }

  fn clear(&self, seq: u64) {
    let mut inner = self.lock();
    inner.entries.clear();
    inner.floors.clear();
    inner.global_floor = inner.global_floor.max(seq);
  }
}
