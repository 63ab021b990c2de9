use serde_json::json;

use super::error::ApiError;
use super::resource::{ListMode, Resource, ResourceClient};
use super::types::{
  CreateSupplierRequest, Supplier, SupplierFilters, SupplierStats, UpdateSupplierRequest,
};
use crate::cache::EntityKind;

pub struct Suppliers;

impl Resource for Suppliers {
  type Entity = Supplier;
  type Create = CreateSupplierRequest;
  type Update = UpdateSupplierRequest;
  type Filters = SupplierFilters;

  const KIND: EntityKind = EntityKind::Supplier;
  const BASE_PATH: &'static str = "/inventory/suppliers";
  const ALL_PATH: &'static str = "/inventory/suppliers/all";
  const SINGULAR: &'static str = "supplier";
  const PLURAL: &'static str = "suppliers";
  const LIST_MODE: ListMode = ListMode::Server;
}

impl ResourceClient<Suppliers> {
  pub async fn toggle_status(&self, id: u64, is_active: bool) -> Result<Supplier, ApiError> {
    Ok(
      self
        .gateway()
        .patch(
          &self.path(format!("{}/status", id)),
          &json!({ "isActive": is_active }),
        )
        .await?
        .data,
    )
  }

  pub async fn stats(&self, id: u64) -> Result<SupplierStats, ApiError> {
    Ok(
      self
        .gateway()
        .get(&self.path(format!("{}/stats", id)), &())
        .await?
        .data,
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::gateway::Gateway;
  use crate::session::SessionContext;
  use httpmock::prelude::*;
  use httpmock::Method::{GET, PATCH};
  use std::sync::Arc;
  use std::time::Duration;

  fn client(server: &MockServer) -> ResourceClient<Suppliers> {
    let gateway = Gateway::new(
      &server.base_url(),
      Duration::from_secs(5),
      Arc::new(SessionContext::default()),
    )
    .unwrap();
    ResourceClient::new(gateway)
  }

  #[tokio::test]
  async fn test_toggle_status() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
      when
        .method(PATCH)
        .path("/inventory/suppliers/5/status")
        .json_body(json!({"isActive": false}));
      then
        .status(200)
        .json_body(json!({"id": 5, "name": "Acme", "isActive": false}));
    });

    let supplier = client(&server).toggle_status(5, false).await.unwrap();
    assert_eq!(supplier.is_active, Some(false));
    assert_eq!(mock.calls(), 1);
  }

  #[tokio::test]
  async fn test_stats() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method(GET).path("/inventory/suppliers/5/stats");
      then.status(200).json_body(json!({
        "itemCount": 12,
        "totalPurchaseValue": 1520.5,
        "averageLeadTime": 4.0,
        "lastOrderDate": "2024-03-01"
      }));
    });

    let stats = client(&server).stats(5).await.unwrap();
    assert_eq!(stats.item_count, 12);
    assert_eq!(stats.last_order_date.as_deref(), Some("2024-03-01"));
  }
}
