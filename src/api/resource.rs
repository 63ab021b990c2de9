//! Generic resource client: the operations every entity endpoint shares.

use serde::Serialize;
use serde_json::json;
use std::fmt;
use std::marker::PhantomData;
use tracing::debug;

use super::envelope::{ExportRef, ImportReport, Paginated, PaginationParams, SortOrder};
use super::error::ApiError;
use super::gateway::{Gateway, ProgressFn, UploadFile};
use super::local::paginate;
use super::params::QueryParams;
use crate::cache::{Cacheable, EntityKind, KeyPattern};

/// Where filtering and pagination happen for a resource's list endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
  /// The backend accepts filter and pagination parameters
  Server,
  /// The backend returns the whole unfiltered collection; filtering,
  /// sorting and pagination are done here. Every list call transfers the
  /// full collection.
  Local,
}

/// Static description of one entity endpoint family.
pub trait Resource: Send + Sync + 'static {
  type Entity: Cacheable + fmt::Debug;
  type Create: Serialize + Send + Sync;
  type Update: Serialize + Send + Sync;
  type Filters: QueryParams + Clone + Default + fmt::Debug + Send + Sync + 'static;

  const KIND: EntityKind;
  const BASE_PATH: &'static str;
  /// Unpaginated flat listing
  const ALL_PATH: &'static str;
  /// Lowercase singular and plural names, for messages
  const SINGULAR: &'static str;
  const PLURAL: &'static str;
  const LIST_MODE: ListMode;

  /// Local evaluation of `filters`; only consulted in [`ListMode::Local`].
  fn matches(_filters: &Self::Filters, _entity: &Self::Entity) -> bool {
    true
  }

  /// Local free-text match; only consulted in [`ListMode::Local`].
  fn matches_search(_entity: &Self::Entity, _query: &str) -> bool {
    true
  }

  /// Local ordering by a named field. Unknown fields leave the order alone.
  fn sort(_entities: &mut [Self::Entity], _sort_by: &str, _order: SortOrder) {}

  /// Derived listings a change to one entity makes stale.
  fn aggregates() -> Vec<KeyPattern> {
    vec![KeyPattern::Aggregates(Self::KIND)]
  }

  /// Everything a bulk import can affect.
  fn import_scope() -> Vec<KeyPattern> {
    vec![KeyPattern::Kind(Self::KIND)]
  }

  /// Entries that hang off one entity and go away with it.
  fn dependents(_id: u64) -> Vec<KeyPattern> {
    Vec::new()
  }
}

/// Typed client for one resource.
pub struct ResourceClient<R: Resource> {
  gateway: Gateway,
  _resource: PhantomData<R>,
}

impl<R: Resource> Clone for ResourceClient<R> {
  fn clone(&self) -> Self {
    Self {
      gateway: self.gateway.clone(),
      _resource: PhantomData,
    }
  }
}

impl<R: Resource> ResourceClient<R> {
  pub fn new(gateway: Gateway) -> Self {
    Self {
      gateway,
      _resource: PhantomData,
    }
  }

  pub fn gateway(&self) -> &Gateway {
    &self.gateway
  }

  pub(crate) fn path(&self, suffix: impl fmt::Display) -> String {
    format!("{}/{}", R::BASE_PATH, suffix)
  }

  /// Filtered, paginated list.
  pub async fn list(
    &self,
    filters: &R::Filters,
    pagination: &PaginationParams,
  ) -> Result<Paginated<R::Entity>, ApiError> {
    match R::LIST_MODE {
      ListMode::Server => Ok(
        self
          .gateway
          .get(R::BASE_PATH, &(filters, pagination))
          .await?
          .data,
      ),
      ListMode::Local => {
        let entities = self.fetch_collection().await?;
        Ok(self.page_locally(entities, pagination, |e| R::matches(filters, e)))
      }
    }
  }

  /// Local mode only: apply `keep`, then sort and paginate.
  pub(crate) fn page_locally(
    &self,
    entities: Vec<R::Entity>,
    pagination: &PaginationParams,
    keep: impl Fn(&R::Entity) -> bool,
  ) -> Paginated<R::Entity> {
    let mut matched: Vec<R::Entity> = entities.into_iter().filter(|e| keep(e)).collect();
    if let Some(sort_by) = &pagination.sort_by {
      R::sort(&mut matched, sort_by, pagination.sort_order.unwrap_or_default());
    }
    debug!("{} {} matched locally", matched.len(), R::PLURAL);
    paginate(matched, pagination)
  }

  /// The full collection from the list endpoint (local mode).
  pub(crate) async fn fetch_collection(&self) -> Result<Vec<R::Entity>, ApiError> {
    Ok(self.gateway.get(R::BASE_PATH, &()).await?.data)
  }

  /// Flat, unpaginated listing.
  pub async fn all(&self) -> Result<Vec<R::Entity>, ApiError> {
    Ok(self.gateway.get(R::ALL_PATH, &()).await?.data)
  }

  pub async fn get(&self, id: u64) -> Result<R::Entity, ApiError> {
    Ok(self.gateway.get(&self.path(id), &()).await?.data)
  }

  pub async fn create(&self, request: &R::Create) -> Result<R::Entity, ApiError> {
    Ok(self.gateway.post(R::BASE_PATH, request).await?.data)
  }

  pub async fn update(&self, id: u64, request: &R::Update) -> Result<R::Entity, ApiError> {
    Ok(self.gateway.put(&self.path(id), request).await?.data)
  }

  pub async fn delete(&self, id: u64) -> Result<(), ApiError> {
    self.gateway.delete::<()>(&self.path(id)).await?;
    Ok(())
  }

  pub async fn bulk_delete(&self, ids: &[u64]) -> Result<(), ApiError> {
    self
      .gateway
      .post::<(), _>(&self.path("bulk-delete"), &json!({ "ids": ids }))
      .await?;
    Ok(())
  }

  /// Free-text search. A blank query is not sent; it matches nothing.
  pub async fn search(
    &self,
    query: &str,
    pagination: &PaginationParams,
  ) -> Result<Paginated<R::Entity>, ApiError> {
    if query.trim().is_empty() {
      return Ok(paginate(Vec::new(), pagination));
    }
    match R::LIST_MODE {
      ListMode::Server => {
        let params = (vec![("search", query.trim().to_string())], pagination);
        Ok(self.gateway.get(&self.path("search"), &params).await?.data)
      }
      ListMode::Local => {
        let entities = self.fetch_collection().await?;
        Ok(self.page_locally(entities, pagination, |e| R::matches_search(e, query)))
      }
    }
  }

  /// Ask the backend to generate an export; returns where to download it.
  pub async fn export(&self, filters: &R::Filters) -> Result<ExportRef, ApiError> {
    Ok(self.gateway.get(&self.path("export"), filters).await?.data)
  }

  /// Upload a file of records to create in bulk.
  pub async fn import(&self, file: UploadFile, progress: Option<ProgressFn>) -> Result<ImportReport, ApiError> {
    Ok(
      self
        .gateway
        .upload(&self.path("import"), "file", file, progress)
        .await?
        .data,
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::categories::Categories;
  use crate::api::items::Items;
  use crate::session::SessionContext;
  use httpmock::prelude::*;
  use httpmock::Method::{GET, POST};
  use serde_json::json;
  use std::sync::Arc;
  use std::time::Duration;

  fn gateway(server: &MockServer) -> Gateway {
    Gateway::new(
      &server.base_url(),
      Duration::from_secs(5),
      Arc::new(SessionContext::default()),
    )
    .unwrap()
  }

  #[tokio::test]
  async fn test_bulk_delete_posts_ids() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
      when
        .method(POST)
        .path("/categories/bulk-delete")
        .json_body(json!({"ids": [1, 2, 3]}));
      then.status(200).json_body(json!({"success": true, "data": null}));
    });

    ResourceClient::<Categories>::new(gateway(&server))
      .bulk_delete(&[1, 2, 3])
      .await
      .unwrap();
    assert_eq!(mock.calls(), 1);
  }

  #[tokio::test]
  async fn test_export_sends_filters() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
      when
        .method(GET)
        .path("/Item/export")
        .query_param("categoryId", "4");
      then
        .status(200)
        .json_body(json!({"downloadUrl": "/downloads/items.csv"}));
    });

    let filters = crate::api::types::ItemFilters {
      category_id: Some(4),
      ..Default::default()
    };
    let export = ResourceClient::<Items>::new(gateway(&server))
      .export(&filters)
      .await
      .unwrap();

    assert_eq!(export.download_url, "/downloads/items.csv");
    assert_eq!(mock.calls(), 1);
  }

  #[tokio::test]
  async fn test_import_returns_report() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method(POST).path("/inventory/suppliers/import");
      then.status(200).json_body(json!({
        "success": true,
        "data": {"imported": 3, "errors": []}
      }));
    });

    let report = ResourceClient::<crate::api::suppliers::Suppliers>::new(gateway(&server))
      .import(UploadFile::new("suppliers.csv", b"name\nAcme\n".to_vec()), None)
      .await
      .unwrap();

    assert_eq!(report.imported, 3);
    assert!(report.errors.is_empty());
  }

  #[tokio::test]
  async fn test_blank_search_makes_no_request() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
      when.method(GET).path("/categories/search");
      then.status(200);
    });

    let page = ResourceClient::<Categories>::new(gateway(&server))
      .search("   ", &PaginationParams::default())
      .await
      .unwrap();

    assert!(page.is_empty());
    assert_eq!(page.total_pages, 0);
    assert_eq!(mock.calls(), 0);
  }
}
