//! Cache-synchronized queries and mutations over the resource clients.
//!
//! Reads go through the [`CacheLayer`] keyed by kind, scope and the exact
//! filter/pagination tuple. Mutations go through the [`Mutator`], which
//! applies each operation's cache strategy and reports the outcome.

mod categories;
mod items;
mod resource;
mod suppliers;

use chrono::Duration;
use color_eyre::Result;
use std::sync::Arc;
use tracing::info;

pub use resource::ResourceQueries;

use crate::api::categories::Categories;
use crate::api::error::ApiError;
use crate::api::gateway::Gateway;
use crate::api::items::Items;
use crate::api::resource::ResourceClient;
use crate::api::suppliers::Suppliers;
use crate::cache::{CacheLayer, MemoryStorage, Mutator, NoopStorage};
use crate::config::{CacheConfig, Config};
use crate::notify::Notifier;
use crate::session::SessionContext;

pub type ItemQueries = ResourceQueries<Items>;
pub type CategoryQueries = ResourceQueries<Categories>;
pub type SupplierQueries = ResourceQueries<Suppliers>;

/// Freshness windows per kind of read.
#[derive(Debug, Clone, Copy)]
pub struct StaleTimes {
  /// Lists, details, flat lists, trees and statistics
  pub default: Duration,
  pub low_stock: Duration,
  pub search: Duration,
  pub movements: Duration,
}

impl Default for StaleTimes {
  fn default() -> Self {
    Self::from_config(&CacheConfig::default())
  }
}

impl StaleTimes {
  pub fn from_config(config: &CacheConfig) -> Self {
    Self {
      default: secs(config.stale_time_secs),
      low_stock: secs(config.low_stock_stale_secs),
      search: secs(config.search_stale_secs),
      movements: secs(config.movements_stale_secs),
    }
  }
}

fn secs(s: u64) -> Duration {
  Duration::seconds(i64::try_from(s).unwrap_or(i64::MAX / 1000))
}

/// Everything a front end needs to talk to the backend.
#[derive(Clone)]
pub struct Backend {
  session: Arc<SessionContext>,
  cache: CacheLayer,
  pub items: ItemQueries,
  pub categories: CategoryQueries,
  pub suppliers: SupplierQueries,
}

impl Backend {
  pub fn new(
    config: &Config,
    session: Arc<SessionContext>,
    notifier: Arc<dyn Notifier>,
  ) -> std::result::Result<Self, ApiError> {
    let stale = StaleTimes::from_config(&config.cache);
    let cache = if config.cache.enabled {
      CacheLayer::new(MemoryStorage::new())
    } else {
      CacheLayer::new(NoopStorage)
    };
    let cache = cache
      .with_stale_time(stale.default)
      .with_retry(config.cache.retry_policy());
    let gateway = Gateway::from_config(&config.api, session)?;
    Ok(Self::with_parts(gateway, cache, notifier, stale))
  }

  pub fn with_parts(
    gateway: Gateway,
    cache: CacheLayer,
    notifier: Arc<dyn Notifier>,
    stale: StaleTimes,
  ) -> Self {
    let mutator = Mutator::new(cache.clone(), notifier);
    Self {
      session: gateway.session().clone(),
      items: ResourceQueries::new(ResourceClient::new(gateway.clone()), mutator.clone(), stale),
      categories: ResourceQueries::new(
        ResourceClient::new(gateway.clone()),
        mutator.clone(),
        stale,
      ),
      suppliers: ResourceQueries::new(ResourceClient::new(gateway), mutator, stale),
      cache,
    }
  }

  pub fn session(&self) -> &Arc<SessionContext> {
    &self.session
  }

  pub fn cache(&self) -> &CacheLayer {
    &self.cache
  }

  /// Select the active firm. Cached data belongs to the previous firm, so a
  /// change drops the whole cache.
  pub fn switch_firm(&self, firm_id: Option<String>) -> Result<bool> {
    let changed = self.session.set_firm(firm_id)?;
    if changed {
      info!("Active firm changed, clearing cache");
      self.cache.clear();
    }
    Ok(changed)
  }

  /// Forget the credentials and everything fetched with them.
  pub fn logout(&self) -> Result<()> {
    self.session.clear()?;
    self.cache.clear();
    Ok(())
  }
}
