//! Domain records exchanged with the backend, their request payloads and the
//! filter records used to list them.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use super::params::{push, QueryParams};
use crate::cache::Cacheable;

/// Stock level at or below which an item without its own threshold is low.
pub const DEFAULT_MIN_STOCK_LEVEL: u32 = 5;

// ============================================================================
// Items
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
  pub id: u64,
  pub name: String,
  pub description: Option<String>,
  pub price: f64,
  pub currency_id: u64,
  /// Units on hand; the backend never reports a negative stock
  #[serde(default)]
  pub quantity: u32,
  pub category_id: Option<u64>,
  pub category_name: Option<String>,
  #[serde(default, deserialize_with = "lenient_id")]
  pub supplier_id: Option<u64>,
  pub sku: Option<String>,
  pub barcode: Option<String>,
  pub image_url: Option<String>,
  pub unit_of_measure: Option<String>,
  pub min_stock_level: Option<u32>,
  pub max_stock_level: Option<u32>,
  pub reorder_point: Option<u32>,
  #[serde(default)]
  pub is_composite: bool,
  pub is_active: Option<bool>,
  pub firm_id: Option<u64>,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
}

impl Item {
  pub fn min_stock_level(&self) -> u32 {
    self.min_stock_level.unwrap_or(DEFAULT_MIN_STOCK_LEVEL)
  }

  pub fn is_low_stock(&self) -> bool {
    self.quantity <= self.min_stock_level()
  }

  /// Items without an explicit flag are treated as active.
  pub fn is_active(&self) -> bool {
    self.is_active.unwrap_or(true)
  }

  /// Case-insensitive match against name, sku, barcode and description.
  pub fn matches_search(&self, query: &str) -> bool {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
      return true;
    }
    std::iter::once(Some(self.name.as_str()))
      .chain([
        self.sku.as_deref(),
        self.barcode.as_deref(),
        self.description.as_deref(),
      ])
      .flatten()
      .any(|field| field.to_lowercase().contains(&q))
  }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemRequest {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub price: f64,
  pub currency_id: u64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub quantity: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category_id: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub supplier_id: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sku: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub barcode: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub unit_of_measure: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub min_stock_level: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_stock_level: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reorder_point: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_composite: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_active: Option<bool>,
}

/// Partial update; only the fields that are set are sent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub price: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub currency_id: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub quantity: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub category_id: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub supplier_id: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub sku: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub barcode: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub min_stock_level: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_stock_level: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_active: Option<bool>,
}

/// Absolute stock level update for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockUpdate {
  pub quantity: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFilters {
  pub search: Option<String>,
  pub category_id: Option<u64>,
  pub supplier_id: Option<u64>,
  pub is_active: Option<bool>,
  pub is_low_stock: Option<bool>,
  pub min_price: Option<f64>,
  pub max_price: Option<f64>,
  pub currency_id: Option<u64>,
  pub is_composite: Option<bool>,
}

impl ItemFilters {
  /// Client-side evaluation of every recognized filter field.
  pub fn matches(&self, item: &Item) -> bool {
    if let Some(q) = &self.search {
      if !item.matches_search(q) {
        return false;
      }
    }
    if self.category_id.is_some() && item.category_id != self.category_id {
      return false;
    }
    if self.supplier_id.is_some() && item.supplier_id != self.supplier_id {
      return false;
    }
    if let Some(active) = self.is_active {
      if item.is_active() != active {
        return false;
      }
    }
    if let Some(low) = self.is_low_stock {
      if item.is_low_stock() != low {
        return false;
      }
    }
    if let Some(min) = self.min_price {
      if item.price < min {
        return false;
      }
    }
    if let Some(max) = self.max_price {
      if item.price > max {
        return false;
      }
    }
    if self.currency_id.is_some() && Some(item.currency_id) != self.currency_id {
      return false;
    }
    if let Some(composite) = self.is_composite {
      if item.is_composite != composite {
        return false;
      }
    }
    true
  }
}

impl QueryParams for ItemFilters {
  fn query_pairs(&self) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    push(&mut pairs, "search", self.search.as_deref());
    push(&mut pairs, "categoryId", self.category_id);
    push(&mut pairs, "supplierId", self.supplier_id);
    push(&mut pairs, "isActive", self.is_active);
    push(&mut pairs, "isLowStock", self.is_low_stock);
    push(&mut pairs, "minPrice", self.min_price);
    push(&mut pairs, "maxPrice", self.max_price);
    push(&mut pairs, "currencyId", self.currency_id);
    push(&mut pairs, "isComposite", self.is_composite);
    pairs
  }
}

// ============================================================================
// Stock movements
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementType {
  In,
  Out,
  Adjustment,
  Transfer,
}

impl fmt::Display for MovementType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      MovementType::In => "IN",
      MovementType::Out => "OUT",
      MovementType::Adjustment => "ADJUSTMENT",
      MovementType::Transfer => "TRANSFER",
    };
    f.pad(s)
  }
}

impl FromStr for MovementType {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_uppercase().as_str() {
      "IN" => Ok(MovementType::In),
      "OUT" => Ok(MovementType::Out),
      "ADJUSTMENT" => Ok(MovementType::Adjustment),
      "TRANSFER" => Ok(MovementType::Transfer),
      other => Err(format!(
        "unknown movement type '{}', expected IN, OUT, ADJUSTMENT or TRANSFER",
        other
      )),
    }
  }
}

/// Append-only record of a stock change. There is no update or delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockMovement {
  pub id: u64,
  pub item_id: u64,
  pub movement_type: MovementType,
  pub quantity: i64,
  pub unit_cost: Option<f64>,
  pub total_cost: Option<f64>,
  pub reason: Option<String>,
  pub reference_number: Option<String>,
  pub notes: Option<String>,
  pub user_id: Option<String>,
  #[serde(default)]
  pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStockMovementRequest {
  pub item_id: u64,
  pub movement_type: MovementType,
  pub quantity: i64,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub unit_cost: Option<f64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reason: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub reference_number: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
}

// ============================================================================
// Categories
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
  pub id: u64,
  pub name: String,
  pub description: Option<String>,
  pub parent_category_id: Option<u64>,
  pub firm_id: Option<u64>,
  /// Only populated by the tree endpoint
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub children: Vec<Category>,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryRequest {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub parent_category_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCategoryRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub parent_category_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryFilters {
  pub search: Option<String>,
  pub is_active: Option<bool>,
  pub parent_category_id: Option<u64>,
}

impl QueryParams for CategoryFilters {
  fn query_pairs(&self) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    push(&mut pairs, "search", self.search.as_deref());
    push(&mut pairs, "isActive", self.is_active);
    push(&mut pairs, "parentCategoryId", self.parent_category_id);
    pairs
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
  pub item_count: u64,
  pub total_value: f64,
  pub subcategory_count: u64,
}

// ============================================================================
// Suppliers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Supplier {
  pub id: u64,
  pub name: String,
  pub contact_person: Option<String>,
  pub email: Option<String>,
  pub phone: Option<String>,
  pub address: Option<String>,
  pub country: Option<String>,
  pub tax_id: Option<String>,
  pub notes: Option<String>,
  pub preferred_currency_id: Option<u64>,
  pub is_active: Option<bool>,
  pub firm_id: Option<u64>,
  #[serde(default)]
  pub created_at: String,
  #[serde(default)]
  pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSupplierRequest {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub contact_person: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub phone: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub address: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub country: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tax_id: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub preferred_currency_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSupplierRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub contact_person: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub email: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub phone: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub address: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub country: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierFilters {
  pub search: Option<String>,
  pub country: Option<String>,
  pub is_active: Option<bool>,
}

impl QueryParams for SupplierFilters {
  fn query_pairs(&self) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    push(&mut pairs, "search", self.search.as_deref());
    push(&mut pairs, "country", self.country.as_deref());
    push(&mut pairs, "isActive", self.is_active);
    pairs
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplierStats {
  pub item_count: u64,
  pub total_purchase_value: f64,
  pub average_lead_time: f64,
  pub last_order_date: Option<String>,
}

// ============================================================================
// Cacheable implementations
// ============================================================================

impl Cacheable for Item {
  fn id(&self) -> u64 {
    self.id
  }
}

impl Cacheable for Category {
  fn id(&self) -> u64 {
    self.id
  }
}

impl Cacheable for Supplier {
  fn id(&self) -> u64 {
    self.id
  }
}

impl Cacheable for StockMovement {
  fn id(&self) -> u64 {
    self.id
  }
}

// ============================================================================
// Helpers
// ============================================================================

/// Some endpoints send reference ids as strings ("12"), others as numbers.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Num(u64),
    Str(String),
  }

  match Option::<Raw>::deserialize(deserializer)? {
    None => Ok(None),
    Some(Raw::Num(n)) => Ok(Some(n)),
    Some(Raw::Str(s)) if s.trim().is_empty() => Ok(None),
    Some(Raw::Str(s)) => s
      .trim()
      .parse()
      .map(Some)
      .map_err(serde::de::Error::custom),
  }
}
