//! Text views over cached queries.
//!
//! A view owns its list state and a [`Query`]; it refetches when the cache
//! reports that something it shows went stale, and renders to plain text.

use std::fmt::Write;
use tracing::debug;

use crate::api::envelope::{Paginated, PaginationParams};
use crate::api::types::{Item, ItemFilters};
use crate::cache::{CacheEvent, CacheResult, CacheSource, EntityKind, KeyPattern, KeyScope};
use crate::queries::ItemQueries;
use crate::query::{Query, QueryState};
use crate::state::{ListState, SearchFilter, ViewMode};

type ItemPage = CacheResult<Paginated<Item>>;

/// What the watch loop does after a view handled input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewAction {
  None,
  Redraw,
  Quit,
}

/// Trait for view behavior
///
/// Views handle the lines typed while they are shown and return an action
/// for the watch loop. Views that load data asynchronously use Query<T>
/// internally and poll it in `tick()`.
pub trait View {
  /// Heading shown above the view
  fn title(&self) -> String;

  /// Handle one typed line
  fn handle_input(&mut self, input: &str) -> ViewAction {
    match input.trim() {
      "q" => ViewAction::Quit,
      "r" => {
        self.refresh();
        ViewAction::Redraw
      }
      _ => ViewAction::None,
    }
  }

  /// Commands shown under the view
  fn shortcuts(&self) -> &'static str {
    "r refresh · q quit"
  }

  /// Poll async queries. Returns whether a redraw is needed.
  fn tick(&mut self) -> bool {
    false
  }

  /// React to a cache change
  fn on_cache_event(&mut self, _event: &CacheEvent) {}

  /// Fetch again regardless of the cache
  fn refresh(&mut self);

  /// Entries the view shows, for forced refreshes
  fn watched(&self) -> KeyPattern;

  fn render(&self) -> String;
}

// ============================================================================
// Item list
// ============================================================================

pub struct ItemListView {
  items: ItemQueries,
  state: ListState<ItemFilters>,
  query: Query<ItemPage>,
}

impl ItemListView {
  pub fn new(items: ItemQueries, state: ListState<ItemFilters>) -> Self {
    let query = Self::query(&items, &state);
    let mut view = Self {
      items,
      state,
      query,
    };
    view.query.fetch();
    view
  }

  fn query(items: &ItemQueries, state: &ListState<ItemFilters>) -> Query<ItemPage> {
    let items = items.clone();
    let filters = state.filters().clone();
    let pagination = state.pagination().clone();
    Query::new(move || {
      let items = items.clone();
      let filters = filters.clone();
      let pagination = pagination.clone();
      async move {
        match filters.search.as_deref() {
          Some(q) => items.search(q, &pagination).await,
          None => items.list(&filters, &pagination).await,
        }
      }
    })
  }

  /// Change the list state and reload; the previous request is cancelled.
  pub fn update(&mut self, f: impl FnOnce(&mut ListState<ItemFilters>)) {
    f(&mut self.state);
    self.query = Self::query(&self.items, &self.state);
    self.query.fetch();
  }

  pub fn page(&self) -> Option<&Paginated<Item>> {
    self.query.data().map(|r| &r.data)
  }

  /// Wait for the fetch in flight, if any.
  #[cfg(test)]
  pub async fn settle(&mut self) {
    self.query.settled().await;
  }

  /// Delete the selected items in the background; the outcome arrives as a
  /// notification and the lists refetch through cache events.
  fn delete_selected(&mut self) {
    let ids = self.state.selected_ids();
    if ids.is_empty() {
      return;
    }
    self.state.clear_selection();
    let items = self.items.clone();
    tokio::spawn(async move {
      if let Err(e) = items.bulk_delete(&ids).await {
        debug!("Bulk delete of {:?} failed: {}", ids, e);
      }
    });
  }
}

impl View for ItemListView {
  fn title(&self) -> String {
    match self.state.filters().search() {
      Some(q) => format!("Items matching \"{}\"", q),
      None => "Items".to_string(),
    }
  }

  fn handle_input(&mut self, input: &str) -> ViewAction {
    let input = input.trim();
    if let Some(query) = input.strip_prefix('/') {
      self.update(|s| s.set_search(query));
      return ViewAction::Redraw;
    }

    let (command, arg) = match input.split_once(' ') {
      Some((command, arg)) => (command, arg.trim()),
      None => (input, ""),
    };
    match command {
      "q" => return ViewAction::Quit,
      "r" => self.refresh(),
      "n" => {
        let total_pages = self.page().map(|p| p.total_pages).unwrap_or(1);
        self.update(|s| s.next_page(total_pages));
      }
      "p" => self.update(|s| s.prev_page()),
      "c" => self.update(|s| s.clear_filters()),
      "low" => self.update(|s| {
        s.update_filters(|f| {
          f.is_low_stock = match f.is_low_stock {
            Some(true) => None,
            _ => Some(true),
          }
        })
      }),
      "o" if !arg.is_empty() => self.update(|s| s.sort_by(arg)),
      "l" => match arg.parse() {
        Ok(limit) => self.update(|s| s.set_page_size(limit)),
        Err(_) => return ViewAction::None,
      },
      "f" => self.state.toggle_filters(),
      "g" => {
        let mode = self.state.view_mode().toggled();
        self.state.set_view_mode(mode);
      }
      "s" => match arg.parse() {
        Ok(id) => {
          self.state.toggle(id);
        }
        Err(_) => return ViewAction::None,
      },
      "a" => {
        let ids: Vec<u64> = self
          .page()
          .map(|p| p.data.iter().map(|i| i.id).collect())
          .unwrap_or_default();
        self.state.select_all(ids);
      }
      "x" => self.state.clear_selection(),
      "d" => self.delete_selected(),
      _ => return ViewAction::None,
    }
    ViewAction::Redraw
  }

  fn shortcuts(&self) -> &'static str {
    "n/p page · /text search · low · c clear · o <field> sort · l <n> page size · \
     f filters · g grid · s <id> select · a all · x none · d delete · r refresh · q quit"
  }

  fn tick(&mut self) -> bool {
    self.query.poll()
  }

  fn on_cache_event(&mut self, event: &CacheEvent) {
    let stale = match event {
      CacheEvent::Invalidated(key) | CacheEvent::Removed(key) => {
        key.kind == EntityKind::Item && key.is_collection()
      }
      CacheEvent::Cleared => true,
      CacheEvent::Updated(_) => false,
    };
    if stale {
      self.query.refetch();
    }
  }

  fn refresh(&mut self) {
    self.query.refetch();
  }

  fn watched(&self) -> KeyPattern {
    KeyPattern::Collections(EntityKind::Item)
  }

  fn render(&self) -> String {
    let mut out = render_items(&self.title(), &self.query, self.state.view_mode(), |i| {
      self.state.is_selected(i.id)
    });
    if self.state.show_filters() {
      let _ = writeln!(out, "filters: {}", filter_summary(self.state.filters()));
    }
    if !self.state.selection().is_empty() {
      let _ = writeln!(out, "{} selected", self.state.selection().len());
    }
    out
  }
}

// ============================================================================
// Low stock
// ============================================================================

pub struct LowStockView {
  query: Query<ItemPage>,
}

impl LowStockView {
  pub fn new(items: ItemQueries, pagination: PaginationParams) -> Self {
    let mut query = Query::new(move || {
      let items = items.clone();
      let pagination = pagination.clone();
      async move { items.low_stock(&pagination).await }
    });
    query.fetch();
    Self { query }
  }

  #[cfg(test)]
  pub fn page(&self) -> Option<&Paginated<Item>> {
    self.query.data().map(|r| &r.data)
  }

  /// Wait for the fetch in flight, if any.
  #[cfg(test)]
  pub async fn settle(&mut self) {
    self.query.settled().await;
  }
}

impl View for LowStockView {
  fn title(&self) -> String {
    "Low stock".to_string()
  }

  fn tick(&mut self) -> bool {
    self.query.poll()
  }

  fn on_cache_event(&mut self, event: &CacheEvent) {
    let stale = match event {
      CacheEvent::Invalidated(key) | CacheEvent::Removed(key) => {
        matches!(key.scope, KeyScope::LowStock { .. })
      }
      CacheEvent::Cleared => true,
      CacheEvent::Updated(_) => false,
    };
    if stale {
      self.query.refetch();
    }
  }

  fn refresh(&mut self) {
    self.query.refetch();
  }

  fn watched(&self) -> KeyPattern {
    KeyPattern::Aggregates(EntityKind::Item)
  }

  fn render(&self) -> String {
    render_items(&self.title(), &self.query, ViewMode::Table, |_| false)
  }
}

// ============================================================================
// Rendering
// ============================================================================

fn render_items(
  title: &str,
  query: &Query<ItemPage>,
  mode: ViewMode,
  selected: impl Fn(&Item) -> bool,
) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "{}", title);
  match query.state() {
    QueryState::Idle => {}
    QueryState::Loading => {
      let _ = writeln!(out, "  loading...");
    }
    QueryState::Error(e) => {
      let _ = writeln!(out, "  error: {}", e.user_message("Failed to load items"));
    }
    QueryState::Success(result) => {
      let page = &result.data;
      if page.is_empty() {
        let _ = writeln!(out, "  (no items)");
      }
      for item in &page.data {
        let mark = if selected(item) { "*" } else { " " };
        let line = match mode {
          ViewMode::Table => item_row(item),
          ViewMode::Grid => item_card(item),
        };
        let _ = writeln!(out, "{}{}", mark, line);
      }
      let _ = writeln!(
        out,
        "page {}/{} · {} total{}",
        page.page,
        page.total_pages.max(1),
        page.total,
        source_note(result.source)
      );
    }
  }
  out
}

fn filter_summary(filters: &ItemFilters) -> String {
  let mut parts = Vec::new();
  if let Some(q) = &filters.search {
    parts.push(format!("search \"{}\"", q));
  }
  if let Some(id) = filters.category_id {
    parts.push(format!("category {}", id));
  }
  if let Some(id) = filters.supplier_id {
    parts.push(format!("supplier {}", id));
  }
  if filters.is_low_stock == Some(true) {
    parts.push("low stock".to_string());
  }
  if let Some(active) = filters.is_active {
    parts.push(if active { "active" } else { "inactive" }.to_string());
  }
  if filters.min_price.is_some() || filters.max_price.is_some() {
    let bound = |p: Option<f64>| p.map(|p| format!("{:.2}", p)).unwrap_or_default();
    parts.push(format!("price {}..{}", bound(filters.min_price), bound(filters.max_price)));
  }
  if parts.is_empty() {
    "none".to_string()
  } else {
    parts.join(", ")
  }
}

fn source_note(source: CacheSource) -> &'static str {
  match source {
    CacheSource::Network | CacheSource::CacheFresh => "",
    CacheSource::CacheStale => " (refreshing)",
    CacheSource::Offline => " (offline, showing cached data)",
  }
}

pub fn item_row(item: &Item) -> String {
  format!(
    "{:>6}  {:<32} {:<14} {:>6} {:>10.2}{}",
    item.id,
    truncate(&item.name, 32),
    item.sku.as_deref().unwrap_or("-"),
    item.quantity,
    item.price,
    if item.is_low_stock() { "  LOW" } else { "" }
  )
}

pub fn item_card(item: &Item) -> String {
  format!(
    "[{}] {} · qty {} · {:.2}",
    item.id, item.name, item.quantity, item.price
  )
}

fn truncate(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    let mut t: String = s.chars().take(max.saturating_sub(1)).collect();
    t.push('…');
    t
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::fixtures::item;
  use crate::queries::testing::backend;
  use httpmock::prelude::*;
  use httpmock::Method::{GET, POST};
  use serde_json::json;
  use std::time::Duration;

  fn collection() -> serde_json::Value {
    json!([
      {"id": 1, "name": "Desk", "price": 150.0, "currencyId": 1, "quantity": 2},
      {"id": 2, "name": "Chair", "price": 80.0, "currencyId": 1, "quantity": 40},
      {"id": 3, "name": "Desk lamp", "price": 25.0, "currencyId": 1, "quantity": 9}
    ])
  }

  #[tokio::test]
  async fn test_item_list_search_and_render() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method(GET).path("/Item");
      then.status(200).json_body(collection());
    });
    let (backend, _) = backend(&server);

    let mut view = ItemListView::new(backend.items.clone(), ListState::default());
    view.settle().await;
    assert_eq!(view.page().unwrap().total, 3);

    view.update(|s| s.set_search("desk"));
    view.settle().await;
    let names: Vec<_> = view.page().unwrap().data.iter().map(|i| i.name.clone()).collect();
    assert_eq!(names, vec!["Desk", "Desk lamp"]);

    let text = view.render();
    assert!(text.starts_with("Items matching \"desk\""));
    assert!(text.contains("LOW"));
    assert!(text.contains("2 total"));
  }

  #[tokio::test]
  async fn test_typed_commands_drive_list_state() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method(GET).path("/Item");
      then.status(200).json_body(collection());
    });
    let delete = server.mock(|when, then| {
      when
        .method(POST)
        .path("/Item/bulk-delete")
        .json_body(json!({"ids": [1]}));
      then.status(200);
    });
    let (backend, _) = backend(&server);

    let mut view = ItemListView::new(backend.items.clone(), ListState::with_page_size(2));
    view.settle().await;
    assert_eq!(view.page().unwrap().total_pages, 2);

    // Paging stops at the last page
    assert_eq!(view.handle_input("n"), ViewAction::Redraw);
    view.settle().await;
    view.handle_input("n");
    view.settle().await;
    assert_eq!(view.page().unwrap().page, 2);

    // A filter change goes back to the first page
    view.handle_input("low");
    view.settle().await;
    let page = view.page().unwrap();
    assert_eq!((page.page, page.total), (1, 1));

    view.handle_input("f");
    view.handle_input("g");
    view.handle_input("s 1");
    let text = view.render();
    assert!(text.contains("filters: low stock"), "{}", text);
    assert!(text.contains("*[1] Desk"), "{}", text);
    assert!(text.contains("1 selected"), "{}", text);

    view.handle_input("d");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(delete.calls(), 1);
    assert!(!view.render().contains("selected"));

    assert_eq!(view.handle_input("s one"), ViewAction::None);
    assert_eq!(view.handle_input("bogus"), ViewAction::None);
    assert_eq!(view.handle_input(" q "), ViewAction::Quit);
  }

  #[tokio::test]
  async fn test_low_stock_view_refetches_on_invalidation() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
      when.method(GET).path("/Item");
      then.status(200).json_body(collection());
    });
    let (backend, _) = backend(&server);
    let mut events = backend.cache().subscribe();

    let mut view = LowStockView::new(backend.items.clone(), PaginationParams::default());
    view.settle().await;
    assert_eq!(view.page().unwrap().total, 1);

    backend.cache().invalidate(&view.watched());
    while let Ok(event) = events.try_recv() {
      view.on_cache_event(&event);
    }
    view.settle().await;

    assert_eq!(view.page().unwrap().total, 1);
    assert_eq!(mock.calls(), 2);

    assert_eq!(view.handle_input("n"), ViewAction::None);
    assert_eq!(view.handle_input("q"), ViewAction::Quit);
  }

  #[test]
  fn test_item_row_marks_low_stock() {
    assert!(item_row(&item(1, "Cable", 5)).ends_with("LOW"));
    assert!(!item_row(&item(2, "Cable", 50)).ends_with("LOW"));
    assert_eq!(truncate("abcdef", 4), "abc…");
  }
}
