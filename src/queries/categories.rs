use super::resource::ResourceQueries;
use crate::api::categories::Categories;
use crate::api::envelope::{Paginated, PaginationParams};
use crate::api::error::ApiError;
use crate::api::types::{Category, CategoryFilters, CategoryStats};
use crate::cache::{CacheKey, CacheResult, EntityKind};

impl ResourceQueries<Categories> {
  pub async fn tree(&self) -> Result<CacheResult<Vec<Category>>, ApiError> {
    let client = self.client().clone();
    self
      .cache()
      .fetch(
        CacheKey::tree(EntityKind::Category),
        Some(self.stale().default),
        move || {
          let client = client.clone();
          async move { client.tree().await }
        },
      )
      .await
  }

  /// Shares its cache entry with the equivalent filtered list.
  pub async fn subcategories(
    &self,
    parent_id: u64,
    pagination: &PaginationParams,
  ) -> Result<CacheResult<Paginated<Category>>, ApiError> {
    let filters = CategoryFilters {
      parent_category_id: Some(parent_id),
      ..Default::default()
    };
    self.list(&filters, pagination).await
  }

  pub async fn stats(&self, id: u64) -> Result<CacheResult<CategoryStats>, ApiError> {
    let client = self.client().clone();
    self
      .cache()
      .fetch(
        CacheKey::stats(EntityKind::Category, id),
        Some(self.stale().default),
        move || {
          let client = client.clone();
          async move { client.stats(id).await }
        },
      )
      .await
  }
}
