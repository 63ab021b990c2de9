use super::resource::ResourceQueries;
use crate::api::envelope::{Paginated, PaginationParams};
use crate::api::error::ApiError;
use crate::api::suppliers::Suppliers;
use crate::api::types::{Supplier, SupplierFilters, SupplierStats};
use crate::cache::{CacheKey, CacheResult, EntityKind, KeyPattern, MutationEffects};
use crate::notify::Notification;

impl ResourceQueries<Suppliers> {
  pub async fn active(&self, pagination: &PaginationParams) -> Result<CacheResult<Paginated<Supplier>>, ApiError> {
    let filters = SupplierFilters {
      is_active: Some(true),
      ..Default::default()
    };
    self.list(&filters, pagination).await
  }

  pub async fn by_country(
    &self,
    country: &str,
    pagination: &PaginationParams,
  ) -> Result<CacheResult<Paginated<Supplier>>, ApiError> {
    let filters = SupplierFilters {
      country: Some(country.to_string()),
      ..Default::default()
    };
    self.list(&filters, pagination).await
  }

  pub async fn stats(&self, id: u64) -> Result<CacheResult<SupplierStats>, ApiError> {
    let client = self.client().clone();
    self
      .cache()
      .fetch(
        CacheKey::stats(EntityKind::Supplier, id),
        Some(self.stale().default),
        move || {
          let client = client.clone();
          async move { client.stats(id).await }
        },
      )
      .await
  }

  pub async fn toggle_status(&self, id: u64, is_active: bool) -> Result<Supplier, ApiError> {
    self
      .mutator()
      .mutate(
        self.client().toggle_status(id, is_active),
        |supplier| {
          let verb = if supplier.is_active.unwrap_or(is_active) {
            "activated"
          } else {
            "deactivated"
          };
          MutationEffects::new()
            .write(Self::detail_key(supplier.id), supplier)
            .invalidate(KeyPattern::Collections(EntityKind::Supplier))
            .notify(Notification::success(format!("Supplier {} successfully", verb)))
        },
        "Failed to update supplier status",
      )
      .await
  }
}
