//! Cache layer that orchestrates caching logic with network fetching.

use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::key::{CacheKey, KeyPattern};
use super::mutation::CacheUpdate;
use super::storage::CacheStorage;
use super::traits::CacheResult;
use crate::api::error::ApiError;

type SharedFetch = Shared<BoxFuture<'static, Result<Value, ApiError>>>;

/// Capacity of the event channel; slow subscribers see `Lagged`.
const EVENT_CAPACITY: usize = 256;

/// Change notifications, delivered in the order the writes happened.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent {
  Updated(CacheKey),
  Invalidated(CacheKey),
  Removed(CacheKey),
  Cleared,
}

/// How often and how patiently a failed read is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub retries: u32,
  pub delay: std::time::Duration,
}

impl RetryPolicy {
  pub fn new(retries: u32, delay: std::time::Duration) -> Self {
    Self { retries, delay }
  }

  #[cfg(test)]
  pub fn none() -> Self {
    Self::new(0, std::time::Duration::ZERO)
  }

  async fn run<T, F, Fut>(&self, key: &CacheKey, fetcher: &F) -> Result<T, ApiError>
  where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
  {
    let mut attempt = 0;
    loop {
      match fetcher().await {
        Err(e) if attempt < self.retries && e.is_retryable() => {
          attempt += 1;
          warn!("Fetch of {} failed ({}), retry {}/{}", key, e, attempt, self.retries);
          tokio::time::sleep(self.delay).await;
        }
        result => return result,
      }
    }
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::new(1, std::time::Duration::from_secs(1))
  }
}

struct InFlight {
  seq: u64,
  fetch: SharedFetch,
}

#[derive(Default)]
struct Flights {
  /// The fetch new reads of a key join
  joinable: HashMap<CacheKey, InFlight>,
  /// Fetches per key still running, including ones no longer joinable
  running: HashMap<CacheKey, usize>,
}

impl Flights {
  fn finish(&mut self, key: &CacheKey) {
    if let Some(count) = self.running.get_mut(key) {
      *count -= 1;
      if *count == 0 {
        self.running.remove(key);
      }
    }
  }

  fn is_idle(&self, key: &CacheKey) -> bool {
    !self.running.contains_key(key)
  }
}

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the resource clients and their callers. It serves
/// fresh entries without a network call, shares one request among concurrent
/// identical reads, and refuses to let an older read overwrite newer data.
pub struct CacheLayer {
  storage: Arc<dyn CacheStorage>,
  flights: Arc<Mutex<Flights>>,
  seq: Arc<AtomicU64>,
  events: broadcast::Sender<CacheEvent>,
  /// How long before cached data is considered stale
  stale_time: Duration,
  retry: RetryPolicy,
}

impl CacheLayer {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: impl CacheStorage + 'static) -> Self {
    Self::with_storage(Arc::new(storage))
  }

  fn with_storage(storage: Arc<dyn CacheStorage>) -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self {
      storage,
      flights: Arc::new(Mutex::new(Flights::default())),
      seq: Arc::new(AtomicU64::new(0)),
      events,
      stale_time: Duration::minutes(5),
      retry: RetryPolicy::default(),
    }
  }

  /// Set the default stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  /// Check if cached data is stale based on cached_at timestamp.
  fn is_stale(&self, cached_at: DateTime<Utc>, stale_time: Duration) -> bool {
    Utc::now() - cached_at > stale_time
  }

  fn next_seq(&self) -> u64 {
    self.seq.fetch_add(1, Ordering::SeqCst) + 1
  }

  fn flights(&self) -> MutexGuard<'_, Flights> {
    self.flights.lock().unwrap_or_else(|e| e.into_inner())
  }

  fn emit(&self, event: CacheEvent) {
    // No subscribers is fine
    let _ = self.events.send(event);
  }

  /// Receive every cache event from now on.
  pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
    self.events.subscribe()
  }

  /// Keyed read.
  ///
  /// 1. Fresh entry: return it without a network call
  /// 2. Expired entry: return it and refetch in the background
  /// 3. Invalidated entry or miss: fetch (sharing any identical in-flight
  ///    request) and return the result
  /// 4. On a transient failure after invalidation, return the old value
  ///    (offline mode)
  ///
  /// The fetch runs on its own task, so a caller that stops waiting does not
  /// stop it from landing in the cache.
  pub async fn fetch<T, F, Fut>(
    &self,
    key: CacheKey,
    stale_time: Option<Duration>,
    fetcher: F,
  ) -> Result<CacheResult<T>, ApiError>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let stale_time = stale_time.unwrap_or(self.stale_time);

    let Some(cached) = self.storage.lookup(&key) else {
      let value = self.start(&key, fetcher).await?;
      return Ok(CacheResult::from_network(decode(value)?));
    };

    if cached.invalidated {
      debug!("Cache entry {} invalidated, refetching", key);
      return match self.start(&key, fetcher).await {
        Ok(value) => Ok(CacheResult::from_network(decode(value)?)),
        Err(e) if e.is_retryable() => {
          warn!("Refetch of {} failed, serving cached value: {}", key, e);
          Ok(CacheResult::offline(decode(cached.value)?, cached.cached_at))
        }
        Err(e) => Err(e),
      };
    }

    if !self.is_stale(cached.cached_at, stale_time) {
      return Ok(CacheResult::from_cache(
        decode(cached.value)?,
        cached.cached_at,
        false,
      ));
    }

    debug!("Cache entry {} stale, refreshing in background", key);
    let refresh = self.start(&key, fetcher);
    let refreshed = key.clone();
    tokio::spawn(async move {
      if let Err(e) = refresh.await {
        warn!("Background refresh of {} failed: {}", refreshed, e);
      }
    });
    Ok(CacheResult::from_cache(
      decode(cached.value)?,
      cached.cached_at,
      true,
    ))
  }

  /// Join the in-flight request for `key`, or start one on its own task.
  fn start<T, F, Fut>(&self, key: &CacheKey, fetcher: F) -> SharedFetch
  where
    T: Serialize + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    let mut flights = self.flights();
    if let Some(existing) = flights.joinable.get(key) {
      debug!("Joining in-flight fetch for {}", key);
      return existing.fetch.clone();
    }

    let seq = self.next_seq();
    let layer = self.clone();
    let owned_key = key.clone();
    let fetch = async move {
      let result = layer
        .retry
        .run(&owned_key, &fetcher)
        .await
        .and_then(|data| serde_json::to_value(data).map_err(ApiError::from));
      layer.complete(&owned_key, seq, &result);
      result
    }
    .boxed()
    .shared();

    flights.joinable.insert(
      key.clone(),
      InFlight {
        seq,
        fetch: fetch.clone(),
      },
    );
    *flights.running.entry(key.clone()).or_insert(0) += 1;
    tokio::spawn(fetch.clone());
    fetch
  }

  fn complete(&self, key: &CacheKey, seq: u64, result: &Result<Value, ApiError>) {
    if let Ok(value) = result {
      if self.storage.write(key, value.clone(), seq) {
        self.emit(CacheEvent::Updated(key.clone()));
      } else {
        debug!("Discarding superseded result for {} (seq {})", key, seq);
      }
    }

    let mut flights = self.flights();
    if flights.joinable.get(key).map(|f| f.seq) == Some(seq) {
      flights.joinable.remove(key);
    }
    flights.finish(key);
    if flights.is_idle(key) {
      self.storage.prune_floor(key);
    }
  }

  /// Stop new reads from joining in-flight fetches matching `pattern`.
  fn forget_in_flight(&self, pattern: &KeyPattern) -> Vec<CacheKey> {
    let mut flights = self.flights();
    let keys: Vec<CacheKey> = flights
      .joinable
      .keys()
      .filter(|k| pattern.matches(k))
      .cloned()
      .collect();
    for key in &keys {
      flights.joinable.remove(key);
    }
    keys
  }

  /// Forget in-flight reads matching `pattern`; their results will land
  /// below the new floor and be discarded.
  fn detach_in_flight(&self, pattern: &KeyPattern, seq: u64) {
    for key in self.forget_in_flight(pattern) {
      self.storage.raise_floor(&key, seq);
    }
  }

  /// Drop the floors of `keys` that no running fetch can still write to.
  fn prune_idle<'a>(&self, keys: impl IntoIterator<Item = &'a CacheKey>) {
    let flights = self.flights();
    for key in keys {
      if flights.is_idle(key) {
        self.storage.prune_floor(key);
      }
    }
  }

  /// Write a value into the cache directly, superseding any in-flight read.
  #[cfg(test)]
  pub fn set_query_data<T: Serialize>(&self, key: &CacheKey, data: &T) -> Result<(), ApiError> {
    let value = serde_json::to_value(data)?;
    self.write_value(key, value);
    Ok(())
  }

  fn write_value(&self, key: &CacheKey, value: Value) {
    // The write raises the floor to `seq`, so a read already in flight lands
    // below it
    let seq = self.next_seq();
    let written = self.storage.write(key, value, seq);
    self.forget_in_flight(&KeyPattern::Exact(key.clone()));
    if written {
      self.emit(CacheEvent::Updated(key.clone()));
    }
    self.prune_idle([key]);
  }

  /// Cached value regardless of staleness.
  pub fn get_query_data<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
    let cached = self.storage.lookup(key)?;
    match decode(cached.value) {
      Ok(data) => Some(data),
      Err(e) => {
        warn!("Cached value for {} has an unexpected shape: {}", key, e);
        None
      }
    }
  }

  #[cfg(test)]
  pub fn is_invalidated(&self, key: &CacheKey) -> bool {
    self
      .storage
      .lookup(key)
      .map(|c| c.invalidated)
      .unwrap_or(false)
  }

  /// Mark matching entries stale; the next read of each refetches.
  pub fn invalidate(&self, pattern: &KeyPattern) -> Vec<CacheKey> {
    let seq = self.next_seq();
    self.detach_in_flight(pattern, seq);
    let keys = self.storage.invalidate(pattern, seq);
    debug!("Invalidated {} entries matching {:?}", keys.len(), pattern);
    for key in &keys {
      self.emit(CacheEvent::Invalidated(key.clone()));
    }
    self.prune_idle(&keys);
    keys
  }

  /// Evict matching entries.
  pub fn remove(&self, pattern: &KeyPattern) -> Vec<CacheKey> {
    let seq = self.next_seq();
    self.detach_in_flight(pattern, seq);
    let keys = self.storage.remove(pattern, seq);
    debug!("Removed {} entries matching {:?}", keys.len(), pattern);
    for key in &keys {
      self.emit(CacheEvent::Removed(key.clone()));
    }
    self.prune_idle(&keys);
    keys
  }

  /// Apply mutation effects in order.
  pub fn apply(&self, updates: Vec<CacheUpdate>) {
    for update in updates {
      match update {
        CacheUpdate::Write { key, value } => self.write_value(&key, value),
        CacheUpdate::Invalidate(pattern) => {
          self.invalidate(&pattern);
        }
        CacheUpdate::Remove(pattern) => {
          self.remove(&pattern);
        }
      }
    }
  }

  /// Drop everything, including results of reads still in flight.
  pub fn clear(&self) {
    let seq = self.next_seq();
    self.flights().joinable.clear();
    self.storage.clear(seq);
    self.emit(CacheEvent::Cleared);
  }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
  serde_json::from_value(value).map_err(ApiError::from)
}

impl Clone for CacheLayer {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      flights: Arc::clone(&self.flights),
      seq: Arc::clone(&self.seq),
      events: self.events.clone(),
      stale_time: self.stale_time,
      retry: self.retry,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, EntityKind, MemoryStorage, NoopStorage};
  use std::sync::atomic::AtomicUsize;
  use std::time::Duration as StdDuration;

  fn layer() -> CacheLayer {
    CacheLayer::new(MemoryStorage::new()).with_retry(RetryPolicy::new(1, StdDuration::ZERO))
  }

  fn key() -> CacheKey {
    CacheKey::list(EntityKind::Item, &())
  }

  /// Fetcher returning `value` after `delay`, counting its calls.
  fn counted(
    calls: &Arc<AtomicUsize>,
    value: &'static str,
    delay_ms: u64,
  ) -> impl Fn() -> BoxFuture<'static, Result<String, ApiError>> + Send + Sync + 'static {
    let calls = calls.clone();
    move || {
      calls.fetch_add(1, Ordering::SeqCst);
      async move {
        tokio::time::sleep(StdDuration::from_millis(delay_ms)).await;
        Ok(value.to_string())
      }
      .boxed()
    }
  }

  #[tokio::test]
  async fn test_fresh_entry_is_served_from_cache() {
    let cache = layer();
    let calls = Arc::new(AtomicUsize::new(0));

    let first = cache
      .fetch(key(), None, counted(&calls, "a", 0))
      .await
      .unwrap();
    let second = cache
      .fetch(key(), None, counted(&calls, "b", 0))
      .await
      .unwrap();

    assert_eq!(first.source, CacheSource::Network);
    assert_eq!(second.source, CacheSource::CacheFresh);
    assert_eq!(second.data, "a");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_concurrent_reads_share_one_request() {
    let cache = layer();
    let calls = Arc::new(AtomicUsize::new(0));

    let (a, b, c) = tokio::join!(
      cache.fetch::<String, _, _>(key(), None, counted(&calls, "x", 30)),
      cache.fetch::<String, _, _>(key(), None, counted(&calls, "y", 30)),
      cache.fetch::<String, _, _>(key(), None, counted(&calls, "z", 30)),
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(a.unwrap().data, "x");
    assert_eq!(b.unwrap().data, "x");
    assert_eq!(c.unwrap().data, "x");
  }

  #[tokio::test]
  async fn test_expired_entry_returns_stale_and_refreshes() {
    let cache = layer();
    let calls = Arc::new(AtomicUsize::new(0));
    let window = Some(Duration::milliseconds(20));

    cache
      .fetch(key(), window, counted(&calls, "old", 0))
      .await
      .unwrap();
    tokio::time::sleep(StdDuration::from_millis(40)).await;

    let stale = cache
      .fetch(key(), window, counted(&calls, "new", 0))
      .await
      .unwrap();
    assert_eq!(stale.source, CacheSource::CacheStale);
    assert_eq!(stale.data, "old");

    tokio::time::sleep(StdDuration::from_millis(30)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.get_query_data::<String>(&key()).unwrap(), "new");
  }

  #[tokio::test]
  async fn test_invalidated_entry_is_refetched_before_returning() {
    let cache = layer();
    let calls = Arc::new(AtomicUsize::new(0));

    cache
      .fetch(key(), None, counted(&calls, "old", 0))
      .await
      .unwrap();
    cache.invalidate(&KeyPattern::Collections(EntityKind::Item));
    assert!(cache.is_invalidated(&key()));

    let result = cache
      .fetch(key(), None, counted(&calls, "new", 0))
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data, "new");
    assert!(!cache.is_invalidated(&key()));
  }

  #[tokio::test]
  async fn test_invalidated_entry_served_offline_on_transport_error() {
    let cache = layer();
    let calls = Arc::new(AtomicUsize::new(0));
    cache
      .fetch(key(), None, counted(&calls, "old", 0))
      .await
      .unwrap();
    cache.invalidate(&KeyPattern::Exact(key()));

    let result = cache
      .fetch::<String, _, _>(key(), None, || async {
        Err(ApiError::Transport("connection refused".into()))
      })
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Offline);
    assert_eq!(result.data, "old");
  }

  #[tokio::test]
  async fn test_slow_earlier_read_never_overwrites_later_read() {
    let cache = layer();
    let calls = Arc::new(AtomicUsize::new(0));

    let slow = {
      let cache = cache.clone();
      let fetcher = counted(&calls, "old", 100);
      tokio::spawn(async move { cache.fetch(key(), None, fetcher).await })
    };
    tokio::time::sleep(StdDuration::from_millis(10)).await;

    cache.invalidate(&KeyPattern::Exact(key()));
    let fast = cache
      .fetch(key(), None, counted(&calls, "new", 0))
      .await
      .unwrap();
    assert_eq!(fast.data, "new");

    slow.await.unwrap().unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.get_query_data::<String>(&key()).unwrap(), "new");
  }

  #[tokio::test]
  async fn test_direct_write_wins_over_slow_read() {
    let cache = layer();
    let calls = Arc::new(AtomicUsize::new(0));

    let slow = {
      let cache = cache.clone();
      let fetcher = counted(&calls, "fetched", 50);
      tokio::spawn(async move { cache.fetch(key(), None, fetcher).await })
    };
    tokio::time::sleep(StdDuration::from_millis(10)).await;

    cache.set_query_data(&key(), &"written").unwrap();
    slow.await.unwrap().unwrap();

    assert_eq!(cache.get_query_data::<String>(&key()).unwrap(), "written");
    let next = cache
      .fetch(key(), None, counted(&calls, "again", 0))
      .await
      .unwrap();
    assert_eq!(next.source, CacheSource::CacheFresh);
    assert_eq!(next.data, "written");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_abandoned_read_still_lands() {
    let cache = layer();
    let calls = Arc::new(AtomicUsize::new(0));

    let reader = {
      let cache = cache.clone();
      let fetcher = counted(&calls, "first", 40);
      tokio::spawn(async move { cache.fetch(key(), None, fetcher).await })
    };
    tokio::time::sleep(StdDuration::from_millis(10)).await;
    reader.abort();
    tokio::time::sleep(StdDuration::from_millis(60)).await;

    assert!(cache.flights().joinable.is_empty());
    assert_eq!(cache.get_query_data::<String>(&key()).unwrap(), "first");

    cache.invalidate(&KeyPattern::Exact(key()));
    let again = cache
      .fetch(key(), None, counted(&calls, "second", 0))
      .await
      .unwrap();
    assert_eq!(again.data, "second");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[derive(Clone, Default)]
  struct Captured(Arc<Mutex<Vec<u8>>>);

  impl std::io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
      self.0.lock().unwrap().extend_from_slice(buf);
      Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
      Ok(())
    }
  }

  #[tokio::test]
  async fn test_failed_background_refresh_is_logged() {
    let logs = Captured::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
      .with_writer(move || writer.clone())
      .with_ansi(false)
      .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let cache = layer();
    let calls = Arc::new(AtomicUsize::new(0));
    let window = Some(Duration::milliseconds(20));
    cache
      .fetch(key(), window, counted(&calls, "old", 0))
      .await
      .unwrap();
    tokio::time::sleep(StdDuration::from_millis(40)).await;

    let stale = cache
      .fetch::<String, _, _>(key(), window, || async {
        Err(ApiError::Transport("connection refused".into()))
      })
      .await
      .unwrap();
    assert_eq!(stale.source, CacheSource::CacheStale);
    tokio::time::sleep(StdDuration::from_millis(30)).await;

    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    assert!(output.contains("Background refresh of"), "{}", output);
    assert!(output.contains("connection refused"), "{}", output);
    assert!(cache.flights().joinable.is_empty());
    assert_eq!(cache.get_query_data::<String>(&key()).unwrap(), "old");
  }

  #[tokio::test]
  async fn test_floors_are_pruned_once_reads_settle() {
    let storage = Arc::new(MemoryStorage::new());
    let cache = CacheLayer::with_storage(storage.clone())
      .with_retry(RetryPolicy::new(1, StdDuration::ZERO));
    let calls = Arc::new(AtomicUsize::new(0));

    let slow = {
      let cache = cache.clone();
      let fetcher = counted(&calls, "fetched", 40);
      tokio::spawn(async move { cache.fetch(key(), None, fetcher).await })
    };
    tokio::time::sleep(StdDuration::from_millis(10)).await;

    // The running read must still be rejected, so the floor stays
    cache.set_query_data(&key(), &"written").unwrap();
    assert_eq!(storage.tracked_floors(), 1);

    slow.await.unwrap().unwrap();
    assert_eq!(storage.tracked_floors(), 0);
    assert_eq!(cache.get_query_data::<String>(&key()).unwrap(), "written");

    for id in 0..50 {
      cache
        .set_query_data(&CacheKey::detail(EntityKind::Item, id), &id)
        .unwrap();
    }
    cache.invalidate(&KeyPattern::Kind(EntityKind::Item));
    cache.remove(&KeyPattern::Detail(EntityKind::Item, 3));
    assert_eq!(storage.tracked_floors(), 0);
  }

  #[tokio::test]
  async fn test_transport_error_is_retried_once() {
    let cache = layer();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let result = cache
      .fetch(key(), None, move || {
        let attempt = counter.fetch_add(1, Ordering::SeqCst);
        async move {
          if attempt == 0 {
            Err(ApiError::Transport("reset".into()))
          } else {
            Ok("ok".to_string())
          }
        }
      })
      .await
      .unwrap();

    assert_eq!(result.data, "ok");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_validation_error_is_not_retried() {
    let cache = layer();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();

    let err = cache
      .fetch::<String, _, _>(key(), None, move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async {
          Err(ApiError::Validation {
            message: Some("bad filter".into()),
            errors: Default::default(),
          })
        }
      })
      .await
      .unwrap_err();

    assert!(matches!(err, ApiError::Validation { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_events_follow_write_order() {
    let cache = layer();
    let detail = CacheKey::detail(EntityKind::Item, 1);
    let mut events = cache.subscribe();

    cache.set_query_data(&detail, &1).unwrap();
    cache.invalidate(&KeyPattern::Detail(EntityKind::Item, 1));
    cache.remove(&KeyPattern::Detail(EntityKind::Item, 1));
    cache.clear();

    assert_eq!(events.try_recv().unwrap(), CacheEvent::Updated(detail.clone()));
    assert_eq!(events.try_recv().unwrap(), CacheEvent::Invalidated(detail.clone()));
    assert_eq!(events.try_recv().unwrap(), CacheEvent::Removed(detail));
    assert_eq!(events.try_recv().unwrap(), CacheEvent::Cleared);
  }

  #[tokio::test]
  async fn test_remove_then_read_is_a_miss() {
    let cache = layer();
    let detail = CacheKey::detail(EntityKind::Item, 4);
    cache.set_query_data(&detail, &"item").unwrap();

    cache.remove(&KeyPattern::Detail(EntityKind::Item, 4));
    assert!(cache.get_query_data::<String>(&detail).is_none());
  }

  #[tokio::test]
  async fn test_clear_discards_in_flight_results() {
    let cache = layer();
    let calls = Arc::new(AtomicUsize::new(0));

    let slow = {
      let cache = cache.clone();
      let fetcher = counted(&calls, "old", 50);
      tokio::spawn(async move { cache.fetch(key(), None, fetcher).await })
    };
    tokio::time::sleep(StdDuration::from_millis(10)).await;

    cache.clear();
    slow.await.unwrap().unwrap();
    assert!(cache.get_query_data::<String>(&key()).is_none());
  }

  #[tokio::test]
  async fn test_noop_storage_always_fetches() {
    let cache = CacheLayer::new(NoopStorage);
    let calls = Arc::new(AtomicUsize::new(0));

    cache
      .fetch(key(), None, counted(&calls, "a", 0))
      .await
      .unwrap();
    cache
      .fetch(key(), None, counted(&calls, "a", 0))
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }
}
