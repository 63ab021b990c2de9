//! Items, their stock levels, movement history and images.
//!
//! `GET /Item` returns the whole unpaginated collection, so every item
//! listing (plain, search, low-stock, by category, by supplier) is filtered,
//! sorted and paginated locally.

use std::cmp::Ordering;

use super::envelope::{ImageRef, Paginated, PaginationParams, SortOrder};
use super::error::ApiError;
use super::gateway::{ProgressFn, UploadFile};
use super::resource::{ListMode, Resource, ResourceClient};
use super::types::{
  CreateItemRequest, CreateStockMovementRequest, Item, ItemFilters, StockMovement, StockUpdate,
  UpdateItemRequest,
};
use crate::cache::{EntityKind, KeyPattern};

pub const STOCK_MOVEMENTS_PATH: &str = "/stock-movements";

pub struct Items;

impl Resource for Items {
  type Entity = Item;
  type Create = CreateItemRequest;
  type Update = UpdateItemRequest;
  type Filters = ItemFilters;

  const KIND: EntityKind = EntityKind::Item;
  const BASE_PATH: &'static str = "/Item";
  const ALL_PATH: &'static str = "/Item";
  const SINGULAR: &'static str = "item";
  const PLURAL: &'static str = "items";
  const LIST_MODE: ListMode = ListMode::Local;

  fn matches(filters: &ItemFilters, item: &Item) -> bool {
    filters.matches(item)
  }

  fn matches_search(item: &Item, query: &str) -> bool {
    item.matches_search(query)
  }

  fn sort(items: &mut [Item], sort_by: &str, order: SortOrder) {
    let cmp: fn(&Item, &Item) -> Ordering = match sort_by {
      "name" => |a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()),
      "price" => |a, b| a.price.total_cmp(&b.price),
      "quantity" => |a, b| a.quantity.cmp(&b.quantity),
      "createdAt" => |a, b| a.created_at.cmp(&b.created_at),
      _ => return,
    };
    items.sort_by(|a, b| match order {
      SortOrder::Asc => cmp(a, b),
      SortOrder::Desc => cmp(b, a),
    });
  }

  fn aggregates() -> Vec<KeyPattern> {
    vec![KeyPattern::Aggregates(EntityKind::Item)]
  }

  fn import_scope() -> Vec<KeyPattern> {
    vec![
      KeyPattern::Kind(EntityKind::Item),
      KeyPattern::Kind(EntityKind::StockMovement),
    ]
  }

  fn dependents(id: u64) -> Vec<KeyPattern> {
    vec![KeyPattern::Movements(id)]
  }
}

impl ResourceClient<Items> {
  /// Items at or below their minimum stock level.
  pub async fn low_stock(&self, pagination: &PaginationParams) -> Result<Paginated<Item>, ApiError> {
    let items = self.fetch_collection().await?;
    Ok(self.page_locally(items, pagination, Item::is_low_stock))
  }

  pub async fn by_category(
    &self,
    category_id: u64,
    pagination: &PaginationParams,
  ) -> Result<Paginated<Item>, ApiError> {
    let items = self.fetch_collection().await?;
    Ok(self.page_locally(items, pagination, |i| {
      i.category_id == Some(category_id)
    }))
  }

  pub async fn by_supplier(
    &self,
    supplier_id: u64,
    pagination: &PaginationParams,
  ) -> Result<Paginated<Item>, ApiError> {
    let items = self.fetch_collection().await?;
    Ok(self.page_locally(items, pagination, |i| {
      i.supplier_id == Some(supplier_id)
    }))
  }

  /// Set the absolute stock level.
  pub async fn update_stock(&self, id: u64, update: &StockUpdate) -> Result<Item, ApiError> {
    Ok(
      self
        .gateway()
        .patch(&self.path(format!("{}/stock", id)), update)
        .await?
        .data,
    )
  }

  /// Movement history of one item, paginated by the backend.
  pub async fn movements(
    &self,
    item_id: u64,
    pagination: &PaginationParams,
  ) -> Result<Paginated<StockMovement>, ApiError> {
    Ok(
      self
        .gateway()
        .get(&self.path(format!("{}/stock-movements", item_id)), pagination)
        .await?
        .data,
    )
  }

  pub async fn create_movement(&self, request: &CreateStockMovementRequest) -> Result<StockMovement, ApiError> {
    Ok(self.gateway().post(STOCK_MOVEMENTS_PATH, request).await?.data)
  }

  pub async fn upload_image(
    &self,
    id: u64,
    file: UploadFile,
    progress: Option<ProgressFn>,
  ) -> Result<ImageRef, ApiError> {
    Ok(
      self
        .gateway()
        .upload(&self.path(format!("{}/image", id)), "image", file, progress)
        .await?
        .data,
    )
  }

  pub async fn delete_image(&self, id: u64) -> Result<(), ApiError> {
    self
      .gateway()
      .delete::<()>(&self.path(format!("{}/image", id)))
      .await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::gateway::Gateway;
  use crate::session::SessionContext;
  use httpmock::prelude::*;
  use httpmock::Method::{GET, PATCH, POST};
  use serde_json::{json, Value};
  use std::sync::Arc;
  use std::time::Duration;

  fn client(server: &MockServer) -> ResourceClient<Items> {
    let gateway = Gateway::new(
      &server.base_url(),
      Duration::from_secs(5),
      Arc::new(SessionContext::default()),
    )
    .unwrap();
    ResourceClient::new(gateway)
  }

  fn item_json(id: u64, name: &str, quantity: u32, price: f64, category: Option<u64>) -> Value {
    json!({
      "id": id,
      "name": name,
      "price": price,
      "currencyId": 1,
      "quantity": quantity,
      "categoryId": category,
      "supplierId": "2",
      "createdAt": format!("2024-01-0{}T00:00:00", id),
      "updatedAt": "2024-01-01T00:00:00"
    })
  }

  fn mock_collection(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
      when.method(GET).path("/Item");
      then.status(200).json_body(json!([
        item_json(1, "Desk", 2, 150.0, Some(3)),
        item_json(2, "Chair", 40, 80.0, Some(3)),
        item_json(3, "Lamp", 4, 25.0, None),
        item_json(4, "Monitor", 12, 220.0, Some(5)),
      ]));
    })
  }

  #[tokio::test]
  async fn test_list_filters_sorts_and_paginates_locally() {
    let server = MockServer::start();
    mock_collection(&server);

    let pagination = PaginationParams {
      page: 1,
      limit: 2,
      sort_by: Some("price".into()),
      sort_order: Some(SortOrder::Desc),
    };
    let page = client(&server)
      .list(&ItemFilters::default(), &pagination)
      .await
      .unwrap();

    let names: Vec<_> = page.data.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["Monitor", "Desk"]);
    assert_eq!(page.total, 4);
    assert_eq!(page.total_pages, 2);
  }

  #[tokio::test]
  async fn test_search_without_matches_is_empty_page() {
    let server = MockServer::start();
    mock_collection(&server);

    let page = client(&server)
      .search("headphones", &PaginationParams::page(1, 20))
      .await
      .unwrap();

    assert!(page.data.is_empty());
    assert_eq!(page.total, 0);
    assert_eq!(page.total_pages, 0);
  }

  #[tokio::test]
  async fn test_low_stock_and_by_category() {
    let server = MockServer::start();
    mock_collection(&server);
    let items = client(&server);

    let low = items.low_stock(&PaginationParams::default()).await.unwrap();
    let low_ids: Vec<u64> = low.data.iter().map(|i| i.id).collect();
    assert_eq!(low_ids, vec![1, 3]);

    let by_cat = items
      .by_category(3, &PaginationParams::default())
      .await
      .unwrap();
    assert_eq!(by_cat.total, 2);

    let by_supplier = items
      .by_supplier(2, &PaginationParams::default())
      .await
      .unwrap();
    assert_eq!(by_supplier.total, 4);
  }

  #[tokio::test]
  async fn test_update_stock_patches() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
      when
        .method(PATCH)
        .path("/Item/3/stock")
        .json_body(json!({"quantity": 9, "reason": "recount"}));
      then
        .status(200)
        .json_body(item_json(3, "Lamp", 9, 25.0, None));
    });

    let item = client(&server)
      .update_stock(
        3,
        &StockUpdate {
          quantity: 9,
          reason: Some("recount".into()),
        },
      )
      .await
      .unwrap();

    assert_eq!(item.quantity, 9);
    assert_eq!(mock.calls(), 1);
  }

  #[tokio::test]
  async fn test_create_movement() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method(POST).path("/stock-movements");
      then.status(201).json_body(json!({
        "id": 70,
        "itemId": 3,
        "movementType": "IN",
        "quantity": 5,
        "userId": "1",
        "createdAt": "2024-02-01T00:00:00"
      }));
    });

    let movement = client(&server)
      .create_movement(&CreateStockMovementRequest {
        item_id: 3,
        movement_type: crate::api::types::MovementType::In,
        quantity: 5,
        unit_cost: None,
        reason: Some("delivery".into()),
        reference_number: None,
        notes: None,
      })
      .await
      .unwrap();

    assert_eq!(movement.id, 70);
    assert_eq!(movement.quantity, 5);
  }
}
