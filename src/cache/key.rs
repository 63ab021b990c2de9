//! Cache keys and the patterns mutations use to address groups of them.

use std::fmt;

use crate::api::params::{canonical, QueryParams};

/// A named resource category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
  Item,
  Category,
  Supplier,
  StockMovement,
}

impl EntityKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      EntityKind::Item => "item",
      EntityKind::Category => "category",
      EntityKind::Supplier => "supplier",
      EntityKind::StockMovement => "stock_movement",
    }
  }
}

/// Which read a key belongs to. Parameter sets are stored in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyScope {
  /// Filtered, paginated list
  List { params: String },
  /// Flat, unpaginated list (dropdown sources)
  All,
  /// Hierarchical listing
  Tree,
  /// A single entity
  Detail { id: u64 },
  /// Free-text search
  Search { query: String, params: String },
  ByCategory { category_id: u64, params: String },
  BySupplier { supplier_id: u64, params: String },
  /// Items at or below their minimum stock level
  LowStock { params: String },
  /// Stock movement history of one item
  Movements { item_id: u64, params: String },
  /// Per-entity statistics
  Stats { id: u64 },
}

/// Composite of entity kind and the exact read parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  pub kind: EntityKind,
  pub scope: KeyScope,
}

impl CacheKey {
  pub fn new(kind: EntityKind, scope: KeyScope) -> Self {
    Self { kind, scope }
  }

  pub fn list(kind: EntityKind, params: &impl QueryParams) -> Self {
    Self::new(
      kind,
      KeyScope::List {
        params: canonical(params),
      },
    )
  }

  pub fn all(kind: EntityKind) -> Self {
    Self::new(kind, KeyScope::All)
  }

  pub fn tree(kind: EntityKind) -> Self {
    Self::new(kind, KeyScope::Tree)
  }

  pub fn detail(kind: EntityKind, id: u64) -> Self {
    Self::new(kind, KeyScope::Detail { id })
  }

  pub fn search(kind: EntityKind, query: &str, params: &impl QueryParams) -> Self {
    Self::new(
      kind,
      KeyScope::Search {
        query: normalize_query(query),
        params: canonical(params),
      },
    )
  }

  pub fn by_category(category_id: u64, params: &impl QueryParams) -> Self {
    Self::new(
      EntityKind::Item,
      KeyScope::ByCategory {
        category_id,
        params: canonical(params),
      },
    )
  }

  pub fn by_supplier(supplier_id: u64, params: &impl QueryParams) -> Self {
    Self::new(
      EntityKind::Item,
      KeyScope::BySupplier {
        supplier_id,
        params: canonical(params),
      },
    )
  }

  pub fn low_stock(params: &impl QueryParams) -> Self {
    Self::new(
      EntityKind::Item,
      KeyScope::LowStock {
        params: canonical(params),
      },
    )
  }

  pub fn movements(item_id: u64, params: &impl QueryParams) -> Self {
    Self::new(
      EntityKind::StockMovement,
      KeyScope::Movements {
        item_id,
        params: canonical(params),
      },
    )
  }

  pub fn stats(kind: EntityKind, id: u64) -> Self {
    Self::new(kind, KeyScope::Stats { id })
  }

  /// Human-readable, stable description of the key.
  pub fn description(&self) -> String {
    let scope = match &self.scope {
      KeyScope::List { params } => format!("list:{}", params),
      KeyScope::All => "all".to_string(),
      KeyScope::Tree => "tree".to_string(),
      KeyScope::Detail { id } => format!("detail:{}", id),
      KeyScope::Search { query, params } => format!("search:{}:{}", query, params),
      KeyScope::ByCategory {
        category_id,
        params,
      } => format!("by_category:{}:{}", category_id, params),
      KeyScope::BySupplier {
        supplier_id,
        params,
      } => format!("by_supplier:{}:{}", supplier_id, params),
      KeyScope::LowStock { params } => format!("low_stock:{}", params),
      KeyScope::Movements { item_id, params } => format!("movements:{}:{}", item_id, params),
      KeyScope::Stats { id } => format!("stats:{}", id),
    };
    format!("{}:{}", self.kind.as_str(), scope)
  }

  /// Reads that return many entities of the kind.
  pub fn is_collection(&self) -> bool {
    matches!(
      self.scope,
      KeyScope::List { .. }
        | KeyScope::All
        | KeyScope::Tree
        | KeyScope::Search { .. }
        | KeyScope::ByCategory { .. }
        | KeyScope::BySupplier { .. }
    )
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.description())
  }
}

/// Addresses a group of keys for invalidation or removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPattern {
  /// One exact key
  Exact(CacheKey),
  /// Everything cached for the kind
  Kind(EntityKind),
  /// Lists, searches, flat lists, trees and by-X listings of the kind
  Collections(EntityKind),
  /// Derived aggregates of the kind: low-stock listings and statistics
  Aggregates(EntityKind),
  /// Detail slot of one entity
  Detail(EntityKind, u64),
  /// Every page of one item's movement history
  Movements(u64),
}

impl KeyPattern {
  pub fn matches(&self, key: &CacheKey) -> bool {
    match self {
      KeyPattern::Exact(k) => k == key,
      KeyPattern::Kind(kind) => key.kind == *kind,
      KeyPattern::Collections(kind) => key.kind == *kind && key.is_collection(),
      KeyPattern::Aggregates(kind) => {
        key.kind == *kind
          && matches!(key.scope, KeyScope::LowStock { .. } | KeyScope::Stats { .. })
      }
      KeyPattern::Detail(kind, id) => {
        key.kind == *kind && matches!(key.scope, KeyScope::Detail { id: d } if d == *id)
      }
      KeyPattern::Movements(item_id) => {
        matches!(key.scope, KeyScope::Movements { item_id: i, .. } if i == *item_id)
      }
    }
  }
}

/// Queries are sent trimmed but otherwise as typed, so the key keeps the case.
fn normalize_query(query: &str) -> String {
  query.trim().to_string()
}
