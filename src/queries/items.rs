use super::resource::ResourceQueries;
use crate::api::envelope::{ImageRef, Paginated, PaginationParams};
use crate::api::error::ApiError;
use crate::api::gateway::{ProgressFn, UploadFile};
use crate::api::items::Items;
use crate::api::types::{CreateStockMovementRequest, Item, StockMovement, StockUpdate};
use crate::cache::{CacheKey, CacheResult, EntityKind, KeyPattern, MutationEffects};
use crate::notify::Notification;

impl ResourceQueries<Items> {
  pub async fn low_stock(&self, pagination: &PaginationParams) -> Result<CacheResult<Paginated<Item>>, ApiError> {
    let client = self.client().clone();
    let pagination = pagination.clone();
    self
      .cache()
      .fetch(
        CacheKey::low_stock(&pagination),
        Some(self.stale().low_stock),
        move || {
          let client = client.clone();
          let pagination = pagination.clone();
          async move { client.low_stock(&pagination).await }
        },
      )
      .await
  }

  pub async fn by_category(
    &self,
    category_id: u64,
    pagination: &PaginationParams,
  ) -> Result<CacheResult<Paginated<Item>>, ApiError> {
    let client = self.client().clone();
    let pagination = pagination.clone();
    self
      .cache()
      .fetch(
        CacheKey::by_category(category_id, &pagination),
        Some(self.stale().default),
        move || {
          let client = client.clone();
          let pagination = pagination.clone();
          async move { client.by_category(category_id, &pagination).await }
        },
      )
      .await
  }

  pub async fn by_supplier(
    &self,
    supplier_id: u64,
    pagination: &PaginationParams,
  ) -> Result<CacheResult<Paginated<Item>>, ApiError> {
    let client = self.client().clone();
    let pagination = pagination.clone();
    self
      .cache()
      .fetch(
        CacheKey::by_supplier(supplier_id, &pagination),
        Some(self.stale().default),
        move || {
          let client = client.clone();
          let pagination = pagination.clone();
          async move { client.by_supplier(supplier_id, &pagination).await }
        },
      )
      .await
  }

  pub async fn movements(
    &self,
    item_id: u64,
    pagination: &PaginationParams,
  ) -> Result<CacheResult<Paginated<StockMovement>>, ApiError> {
    let client = self.client().clone();
    let pagination = pagination.clone();
    self
      .cache()
      .fetch(
        CacheKey::movements(item_id, &pagination),
        Some(self.stale().movements),
        move || {
          let client = client.clone();
          let pagination = pagination.clone();
          async move { client.movements(item_id, &pagination).await }
        },
      )
      .await
  }

  pub async fn update_stock(&self, id: u64, update: &StockUpdate) -> Result<Item, ApiError> {
    self
      .mutator()
      .mutate(
        self.client().update_stock(id, update),
        |item| {
          MutationEffects::new()
            .write(Self::detail_key(item.id), item)
            .invalidate(KeyPattern::Collections(EntityKind::Item))
            .invalidate(KeyPattern::Aggregates(EntityKind::Item))
            .invalidate(KeyPattern::Movements(item.id))
            .notify(Notification::success("Stock updated successfully"))
        },
        "Failed to update stock",
      )
      .await
  }

  /// Record a stock movement. The backend adjusts the item's quantity, so its
  /// detail is refetched rather than patched.
  pub async fn create_movement(&self, request: &CreateStockMovementRequest) -> Result<StockMovement, ApiError> {
    self
      .mutator()
      .mutate(
        self.client().create_movement(request),
        |movement| {
          MutationEffects::new()
            .invalidate(KeyPattern::Detail(EntityKind::Item, movement.item_id))
            .invalidate(KeyPattern::Movements(movement.item_id))
            .invalidate(KeyPattern::Collections(EntityKind::Item))
            .invalidate(KeyPattern::Aggregates(EntityKind::Item))
            .notify(Notification::success("Stock movement recorded successfully"))
        },
        "Failed to record stock movement",
      )
      .await
  }

  pub async fn upload_image(
    &self,
    id: u64,
    file: UploadFile,
    progress: Option<ProgressFn>,
  ) -> Result<ImageRef, ApiError> {
    self
      .mutator()
      .mutate(
        self.client().upload_image(id, file, progress),
        |image| {
          self
            .patch_image(id, Some(image.image_url.clone()))
            .notify(Notification::success("Image uploaded successfully"))
        },
        "Failed to upload image",
      )
      .await
  }

  pub async fn delete_image(&self, id: u64) -> Result<(), ApiError> {
    self
      .mutator()
      .mutate(
        self.client().delete_image(id),
        |_| {
          self
            .patch_image(id, None)
            .notify(Notification::success("Image deleted successfully"))
        },
        "Failed to delete image",
      )
      .await
  }

  /// Rewrite the image url of a cached detail; listings showing thumbnails
  /// go stale. A detail that is not cached stays uncached.
  fn patch_image(&self, id: u64, image_url: Option<String>) -> MutationEffects {
    let key = Self::detail_key(id);
    let effects = MutationEffects::new().invalidate(KeyPattern::Collections(EntityKind::Item));
    match self.cache().get_query_data::<Item>(&key) {
      Some(mut item) => {
        item.image_url = image_url;
        effects.write(key, &item)
      }
      None => effects,
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::queries::testing::backend;
  use crate::queries::ItemQueries;
  use super::*;
  use crate::api::envelope::ImportReport;
  use crate::api::types::{CreateItemRequest, ItemFilters, MovementType, UpdateItemRequest};
  use crate::cache::CacheSource;
  use crate::notify::NotificationLevel;
  use httpmock::prelude::*;
  use httpmock::Method::{DELETE, GET, PATCH, POST, PUT};
  use serde_json::{json, Value};

  fn item_json(id: u64, name: &str, quantity: u32) -> Value {
    json!({
      "id": id,
      "name": name,
      "price": 12.5,
      "currencyId": 1,
      "quantity": quantity,
      "createdAt": "2024-01-01T00:00:00",
      "updatedAt": "2024-01-01T00:00:00"
    })
  }

  #[tokio::test]
  async fn test_created_item_is_served_from_cache() {
    let server = MockServer::start();
    let create = server.mock(|when, then| {
      when.method(POST).path("/Item");
      then.status(201).json_body(json!({
        "success": true,
        "data": item_json(41, "Stapler", 30)
      }));
    });
    let get = server.mock(|when, then| {
      when.method(GET).path("/Item/41");
      then.status(200).json_body(item_json(41, "Stapler", 30));
    });
    let (backend, notifier) = backend(&server);

    let created = backend
      .items
      .create(&CreateItemRequest {
        name: "Stapler".into(),
        price: 12.5,
        currency_id: 1,
        quantity: Some(30),
        ..Default::default()
      })
      .await
      .unwrap();
    let detail = backend.items.detail(created.id).await.unwrap();

    assert_eq!(detail.source, CacheSource::CacheFresh);
    assert_eq!(detail.data.name, "Stapler");
    assert_eq!(create.calls(), 1);
    assert_eq!(get.calls(), 0);
    assert_eq!(
      notifier.messages(),
      vec![(NotificationLevel::Success, "Item created successfully".to_string())]
    );
  }

  #[tokio::test]
  async fn test_update_during_slow_read_keeps_updated_detail() {
    let server = MockServer::start();
    let get = server.mock(|when, then| {
      when.method(GET).path("/Item/3");
      then
        .status(200)
        .delay(std::time::Duration::from_millis(200))
        .json_body(item_json(3, "Lamp", 4));
    });
    server.mock(|when, then| {
      when.method(PUT).path("/Item/3");
      then.status(200).json_body(item_json(3, "Desk lamp", 4));
    });
    let (backend, _) = backend(&server);

    let reader = {
      let items = backend.items.clone();
      tokio::spawn(async move { items.detail(3).await })
    };
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    backend
      .items
      .update(
        3,
        &UpdateItemRequest {
          name: Some("Desk lamp".into()),
          ..Default::default()
        },
      )
      .await
      .unwrap();
    reader.await.unwrap().unwrap();

    let detail = backend.items.detail(3).await.unwrap();
    assert_eq!(detail.source, CacheSource::CacheFresh);
    assert_eq!(detail.data.name, "Desk lamp");
    assert_eq!(get.calls(), 1);
  }

  #[tokio::test]
  async fn test_delete_evicts_detail_and_invalidates_lists() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method(GET).path("/Item");
      then
        .status(200)
        .json_body(json!([item_json(1, "Desk", 10), item_json(2, "Chair", 3)]));
    });
    server.mock(|when, then| {
      when.method(GET).path("/Item/2");
      then.status(200).json_body(item_json(2, "Chair", 3));
    });
    server.mock(|when, then| {
      when.method(DELETE).path("/Item/2");
      then.status(204);
    });
    let (backend, notifier) = backend(&server);
    let filters = ItemFilters::default();
    let pagination = PaginationParams::default();

    backend.items.list(&filters, &pagination).await.unwrap();
    backend.items.low_stock(&pagination).await.unwrap();
    backend.items.detail(2).await.unwrap();

    backend.items.delete(2).await.unwrap();

    let cache = backend.cache();
    assert!(cache.get_query_data::<Item>(&ItemQueries::detail_key(2)).is_none());
    assert!(cache.is_invalidated(&ItemQueries::list_key(&filters, &pagination)));
    assert!(cache.is_invalidated(&CacheKey::low_stock(&pagination)));
    assert_eq!(
      notifier.messages().last().unwrap().1,
      "Item deleted successfully"
    );
  }

  #[tokio::test]
  async fn test_bulk_delete_message_counts_items() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when
        .method(POST)
        .path("/Item/bulk-delete")
        .json_body(json!({"ids": [1, 2, 3]}));
      then.status(200).json_body(json!({"success": true, "data": null}));
    });
    let (backend, notifier) = backend(&server);

    backend.items.bulk_delete(&[1, 2, 3]).await.unwrap();

    assert_eq!(notifier.messages()[0].1, "3 items deleted successfully");
  }

  #[tokio::test]
  async fn test_import_notification_reports_both_counts() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method(POST).path("/Item/import");
      then.status(200).json_body(json!({
        "success": true,
        "data": {"imported": 8, "errors": ["row 3 invalid SKU"]}
      }));
    });
    let (backend, notifier) = backend(&server);
    let movements = CacheKey::movements(4, &PaginationParams::default());
    backend.cache().set_query_data(&movements, &json!({"data": []})).unwrap();

    let report: ImportReport = backend
      .items
      .import(UploadFile::new("items.csv", b"name,sku\n".to_vec()), None)
      .await
      .unwrap();

    assert_eq!(report.imported, 8);
    assert!(backend.cache().is_invalidated(&movements));
    assert_eq!(
      notifier.messages(),
      vec![(
        NotificationLevel::Error,
        "Import completed with 1 errors. 8 items imported.".to_string()
      )]
    );
  }

  #[tokio::test]
  async fn test_search_without_matches() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method(GET).path("/Item");
      then
        .status(200)
        .json_body(json!([item_json(1, "Desk", 10), item_json(2, "Chair", 3)]));
    });
    let (backend, _) = backend(&server);

    let result = backend
      .items
      .search("headphones", &PaginationParams::page(1, 20))
      .await
      .unwrap();

    assert!(result.data.data.is_empty());
    assert_eq!(result.data.total, 0);
    assert_eq!(result.data.total_pages, 0);
  }

  #[tokio::test]
  async fn test_identical_reads_share_one_request() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
      when.method(GET).path("/Item");
      then
        .status(200)
        .json_body(json!([item_json(1, "Desk", 10)]))
        .delay(std::time::Duration::from_millis(50));
    });
    let (backend, _) = backend(&server);
    let filters = ItemFilters::default();
    let pagination = PaginationParams::default();

    let (a, b) = tokio::join!(
      backend.items.list(&filters, &pagination),
      backend.items.list(&filters, &pagination),
    );

    assert_eq!(a.unwrap().data.total, 1);
    assert_eq!(b.unwrap().data.total, 1);
    assert_eq!(mock.calls(), 1);
  }

  #[tokio::test]
  async fn test_update_stock_writes_detail_and_invalidates_movements() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method(PATCH).path("/Item/3/stock");
      then.status(200).json_body(item_json(3, "Lamp", 9));
    });
    let (backend, _) = backend(&server);
    let movements = CacheKey::movements(3, &PaginationParams::default());
    backend.cache().set_query_data(&movements, &json!({"data": []})).unwrap();

    backend
      .items
      .update_stock(
        3,
        &StockUpdate {
          quantity: 9,
          reason: None,
        },
      )
      .await
      .unwrap();

    let cached: Item = backend.cache().get_query_data(&ItemQueries::detail_key(3)).unwrap();
    assert_eq!(cached.quantity, 9);
    assert!(backend.cache().is_invalidated(&movements));
  }

  #[tokio::test]
  async fn test_movement_invalidates_item_detail() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method(POST).path("/stock-movements");
      then.status(201).json_body(json!({
        "id": 70, "itemId": 3, "movementType": "IN", "quantity": 5,
        "createdAt": "2024-02-01T00:00:00"
      }));
    });
    let (backend, notifier) = backend(&server);
    let detail = ItemQueries::detail_key(3);
    backend.cache().set_query_data(&detail, &item_json(3, "Lamp", 4)).unwrap();

    backend
      .items
      .create_movement(&CreateStockMovementRequest {
        item_id: 3,
        movement_type: MovementType::In,
        quantity: 5,
        unit_cost: None,
        reason: None,
        reference_number: None,
        notes: None,
      })
      .await
      .unwrap();

    assert!(backend.cache().is_invalidated(&detail));
    assert_eq!(notifier.messages()[0].1, "Stock movement recorded successfully");
  }

  #[tokio::test]
  async fn test_image_upload_patches_cached_detail() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method(POST).path("/Item/3/image");
      then
        .status(200)
        .json_body(json!({"imageUrl": "/images/lamp.png"}));
    });
    let (backend, _) = backend(&server);
    let detail = ItemQueries::detail_key(3);
    backend.cache().set_query_data(&detail, &item_json(3, "Lamp", 4)).unwrap();

    backend
      .items
      .upload_image(3, UploadFile::new("lamp.png", vec![0u8; 128]), None)
      .await
      .unwrap();

    let cached: Item = backend.cache().get_query_data(&detail).unwrap();
    assert_eq!(cached.image_url.as_deref(), Some("/images/lamp.png"));
  }

  #[tokio::test]
  async fn test_failed_create_reports_payload_message() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method(POST).path("/Item");
      then
        .status(409)
        .json_body(json!({"message": "SKU already exists"}));
    });
    let (backend, notifier) = backend(&server);

    let result = backend
      .items
      .create(&CreateItemRequest {
        name: "Stapler".into(),
        price: 1.0,
        currency_id: 1,
        ..Default::default()
      })
      .await;

    assert!(result.is_err());
    assert_eq!(
      notifier.messages(),
      vec![(NotificationLevel::Error, "SKU already exists".to_string())]
    );
  }

  #[tokio::test]
  async fn test_bare_not_found_reports_fallback() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method(DELETE).path("/Item/8");
      then.status(404);
    });
    let (backend, notifier) = backend(&server);

    assert!(backend.items.delete(8).await.is_err());
    assert_eq!(
      notifier.messages(),
      vec![(NotificationLevel::Error, "Failed to delete item".to_string())]
    );
  }
}
