//! Cached reads and cache-synchronized mutations shared by every resource.

use super::StaleTimes;
use crate::api::envelope::{ExportRef, ImportReport, Paginated, PaginationParams};
use crate::api::error::ApiError;
use crate::api::gateway::{ProgressFn, UploadFile};
use crate::api::resource::{Resource, ResourceClient};
use crate::cache::{
  CacheKey, CacheLayer, CacheResult, Cacheable, EntityKind, KeyPattern, MutationEffects, Mutator,
};
use crate::notify::Notification;

pub struct ResourceQueries<R: Resource> {
  client: ResourceClient<R>,
  mutator: Mutator,
  stale: StaleTimes,
}

impl<R: Resource> Clone for ResourceQueries<R> {
  fn clone(&self) -> Self {
    Self {
      client: self.client.clone(),
      mutator: self.mutator.clone(),
      stale: self.stale,
    }
  }
}

impl<R: Resource> ResourceQueries<R> {
  pub fn new(client: ResourceClient<R>, mutator: Mutator, stale: StaleTimes) -> Self {
    Self {
      client,
      mutator,
      stale,
    }
  }

  pub fn client(&self) -> &ResourceClient<R> {
    &self.client
  }

  pub fn cache(&self) -> &CacheLayer {
    self.mutator.cache()
  }

  pub(crate) fn mutator(&self) -> &Mutator {
    &self.mutator
  }

  pub(crate) fn stale(&self) -> &StaleTimes {
    &self.stale
  }

  // --------------------------------------------------------------------------
  // Keys
  // --------------------------------------------------------------------------

  pub fn list_key(filters: &R::Filters, pagination: &PaginationParams) -> CacheKey {
    CacheKey::list(R::KIND, &(filters, pagination))
  }

  pub fn detail_key(id: u64) -> CacheKey {
    CacheKey::detail(R::KIND, id)
  }

  pub fn search_key(query: &str, pagination: &PaginationParams) -> CacheKey {
    CacheKey::search(R::KIND, query, pagination)
  }

  pub fn all_key() -> CacheKey {
    CacheKey::all(R::KIND)
  }

  // --------------------------------------------------------------------------
  // Reads
  // --------------------------------------------------------------------------

  pub async fn list(
    &self,
    filters: &R::Filters,
    pagination: &PaginationParams,
  ) -> Result<CacheResult<Paginated<R::Entity>>, ApiError> {
    let client = self.client.clone();
    let filters = filters.clone();
    let pagination = pagination.clone();
    self
      .cache()
      .fetch(
        Self::list_key(&filters, &pagination),
        Some(self.stale.default),
        move || {
          let client = client.clone();
          let filters = filters.clone();
          let pagination = pagination.clone();
          async move { client.list(&filters, &pagination).await }
        },
      )
      .await
  }

  pub async fn detail(&self, id: u64) -> Result<CacheResult<R::Entity>, ApiError> {
    let client = self.client.clone();
    self
      .cache()
      .fetch(Self::detail_key(id), Some(self.stale.default), move || {
        let client = client.clone();
        async move { client.get(id).await }
      })
      .await
  }

  pub async fn search(
    &self,
    query: &str,
    pagination: &PaginationParams,
  ) -> Result<CacheResult<Paginated<R::Entity>>, ApiError> {
    let client = self.client.clone();
    let query = query.to_string();
    let pagination = pagination.clone();
    self
      .cache()
      .fetch(
        Self::search_key(&query, &pagination),
        Some(self.stale.search),
        move || {
          let client = client.clone();
          let query = query.clone();
          let pagination = pagination.clone();
          async move { client.search(&query, &pagination).await }
        },
      )
      .await
  }

  /// Flat listing, for pickers.
  pub async fn all(&self) -> Result<CacheResult<Vec<R::Entity>>, ApiError> {
    let client = self.client.clone();
    self
      .cache()
      .fetch(Self::all_key(), Some(self.stale.default), move || {
        let client = client.clone();
        async move { client.all().await }
      })
      .await
  }

  // --------------------------------------------------------------------------
  // Mutations
  // --------------------------------------------------------------------------

  /// Lists, searches and derived aggregates of this kind.
  pub(crate) fn stale_listings(effects: MutationEffects) -> MutationEffects {
    R::aggregates()
      .into_iter()
      .fold(effects.invalidate(KeyPattern::Collections(R::KIND)), |e, p| {
        e.invalidate(p)
      })
  }

  pub async fn create(&self, request: &R::Create) -> Result<R::Entity, ApiError> {
    self
      .mutator
      .mutate(
        self.client.create(request),
        |entity| {
          Self::stale_listings(MutationEffects::new())
            .write(Self::detail_key(entity.id()), entity)
            .notify(Notification::success(format!(
              "{} created successfully",
              title(R::SINGULAR)
            )))
        },
        &format!("Failed to create {}", R::SINGULAR),
      )
      .await
  }

  pub async fn update(&self, id: u64, request: &R::Update) -> Result<R::Entity, ApiError> {
    self
      .mutator
      .mutate(
        self.client.update(id, request),
        |entity| {
          Self::stale_listings(MutationEffects::new())
            .write(Self::detail_key(entity.id()), entity)
            .notify(Notification::success(format!(
              "{} updated successfully",
              title(R::SINGULAR)
            )))
        },
        &format!("Failed to update {}", R::SINGULAR),
      )
      .await
  }

  pub async fn delete(&self, id: u64) -> Result<(), ApiError> {
    self
      .mutator
      .mutate(
        self.client.delete(id),
        |_| {
          Self::stale_listings(removal(R::KIND, &[id], R::dependents))
            .notify(Notification::success(format!(
              "{} deleted successfully",
              title(R::SINGULAR)
            )))
        },
        &format!("Failed to delete {}", R::SINGULAR),
      )
      .await
  }

  pub async fn bulk_delete(&self, ids: &[u64]) -> Result<(), ApiError> {
    self
      .mutator
      .mutate(
        self.client.bulk_delete(ids),
        |_| {
          Self::stale_listings(removal(R::KIND, ids, R::dependents)).notify(
            Notification::success(format!("{} {} deleted successfully", ids.len(), R::PLURAL)),
          )
        },
        &format!("Failed to delete {}", R::PLURAL),
      )
      .await
  }

  pub async fn export(&self, filters: &R::Filters) -> Result<ExportRef, ApiError> {
    self
      .mutator
      .mutate(
        self.client.export(filters),
        |_| MutationEffects::new().notify(Notification::success("Export started successfully")),
        &format!("Failed to export {}", R::PLURAL),
      )
      .await
  }

  /// Import always reports both counts; any rejected row makes it an error.
  pub async fn import(&self, file: UploadFile, progress: Option<ProgressFn>) -> Result<ImportReport, ApiError> {
    self
      .mutator
      .mutate(
        self.client.import(file, progress),
        |report| {
          R::import_scope()
            .into_iter()
            .fold(MutationEffects::new(), |e, p| e.invalidate(p))
            .notify(import_notification(report, R::PLURAL))
        },
        &format!("Failed to import {}", R::PLURAL),
      )
      .await
  }
}

/// Evict the detail slots of `ids` and everything hanging off them.
fn removal(
  kind: EntityKind,
  ids: &[u64],
  dependents: fn(u64) -> Vec<KeyPattern>,
) -> MutationEffects {
  ids.iter().fold(MutationEffects::new(), |effects, &id| {
    dependents(id)
      .into_iter()
      .fold(effects.remove(KeyPattern::Detail(kind, id)), |e, p| {
        e.remove(p)
      })
  })
}

pub(crate) fn import_notification(report: &ImportReport, plural: &str) -> Notification {
  if report.errors.is_empty() {
    Notification::success(format!(
      "Successfully imported {} {}",
      report.imported, plural
    ))
  } else {
    Notification::error(format!(
      "Import completed with {} errors. {} {} imported.",
      report.errors.len(),
      report.imported,
      plural
    ))
  }
}

/// "item" -> "Item"
pub(crate) fn title(word: &str) -> String {
  let mut chars = word.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().chain(chars).collect(),
    None => String::new(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_import_notification_carries_both_counts() {
    let report = ImportReport {
      imported: 8,
      errors: vec!["row 3 invalid SKU".into()],
    };
    let n = import_notification(&report, "items");
    assert!(n.is_error());
    assert_eq!(n.message, "Import completed with 1 errors. 8 items imported.");

    let clean = ImportReport {
      imported: 8,
      errors: vec![],
    };
    let n = import_notification(&clean, "items");
    assert!(!n.is_error());
    assert_eq!(n.message, "Successfully imported 8 items");
  }

  #[test]
  fn test_title() {
    assert_eq!(title("supplier"), "Supplier");
    assert_eq!(title(""), "");
  }
}
