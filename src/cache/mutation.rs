//! Mutation outcomes and the cache effects they carry.
//!
//! A mutation never touches the cache directly. On success it produces a
//! [`MutationEffects`] describing which entries to write, invalidate or
//! remove, plus the notification to show; the [`Mutator`] applies both.

use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use super::key::{CacheKey, KeyPattern};
use super::layer::CacheLayer;
use crate::api::error::ApiError;
use crate::notify::{Notification, Notifier};

/// One change to apply to the cache after a successful mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheUpdate {
  /// Put the returned entity straight into its detail slot
  Write { key: CacheKey, value: Value },
  /// Mark matching entries stale so the next read refetches
  Invalidate(KeyPattern),
  /// Evict matching entries
  Remove(KeyPattern),
}

impl CacheUpdate {
  pub fn write<T: Serialize>(key: CacheKey, value: &T) -> Result<Self, ApiError> {
    Ok(CacheUpdate::Write {
      key,
      value: serde_json::to_value(value)?,
    })
  }
}

/// Everything a successful mutation asks of the cache and the user.
#[derive(Debug, Clone, Default)]
pub struct MutationEffects {
  pub updates: Vec<CacheUpdate>,
  pub notification: Option<Notification>,
}

impl MutationEffects {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn write<T: Serialize>(mut self, key: CacheKey, value: &T) -> Self {
    match CacheUpdate::write(key, value) {
      Ok(update) => self.updates.push(update),
      Err(e) => warn!("Skipping cache write: {}", e),
    }
    self
  }

  pub fn invalidate(mut self, pattern: KeyPattern) -> Self {
    self.updates.push(CacheUpdate::Invalidate(pattern));
    self
  }

  pub fn remove(mut self, pattern: KeyPattern) -> Self {
    self.updates.push(CacheUpdate::Remove(pattern));
    self
  }

  pub fn notify(mut self, notification: Notification) -> Self {
    self.notification = Some(notification);
    self
  }
}

/// Runs mutations and applies their effects. Mutations are never retried.
#[derive(Clone)]
pub struct Mutator {
  cache: CacheLayer,
  notifier: Arc<dyn Notifier>,
}

impl Mutator {
  pub fn new(cache: CacheLayer, notifier: Arc<dyn Notifier>) -> Self {
    Self { cache, notifier }
  }

  pub fn cache(&self) -> &CacheLayer {
    &self.cache
  }

  /// Await `request`; on success apply the effects built by `on_success`, on
  /// failure notify with the payload message or `fallback`. The error is
  /// still returned so callers can react, but it has already been reported.
  pub async fn mutate<T, Fut, S>(&self, request: Fut, on_success: S, fallback: &str) -> Result<T, ApiError>
  where
    Fut: Future<Output = Result<T, ApiError>>,
    S: FnOnce(&T) -> MutationEffects,
  {
    match request.await {
      Ok(value) => {
        let effects = on_success(&value);
        debug!("Applying {} cache updates", effects.updates.len());
        self.cache.apply(effects.updates);
        if let Some(notification) = effects.notification {
          self.notifier.notify(notification);
        }
        Ok(value)
      }
      Err(e) => {
        warn!("Mutation failed: {}", e);
        self.notifier.notify(Notification::error(e.user_message(fallback)));
        Err(e)
      }
    }
  }
}
