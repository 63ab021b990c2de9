//! View-local state: filters, pagination, selection and presentation of one
//! list view. Nothing here outlives the view.

use std::collections::BTreeSet;

use crate::api::envelope::{PaginationParams, SortOrder};
use crate::api::types::{CategoryFilters, ItemFilters, SupplierFilters};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Filter records with a free-text search field.
pub trait SearchFilter: Clone + Default {
  fn search(&self) -> Option<&str>;
  fn set_search(&mut self, query: Option<String>);
}

macro_rules! search_filter {
  ($($ty:ty),*) => {
    $(impl SearchFilter for $ty {
      fn search(&self) -> Option<&str> {
        self.search.as_deref()
      }

      fn set_search(&mut self, query: Option<String>) {
        self.search = query;
      }
    })*
  };
}

search_filter!(ItemFilters, CategoryFilters, SupplierFilters);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
  #[default]
  Table,
  Grid,
}

impl ViewMode {
  pub fn toggled(self) -> Self {
    match self {
      ViewMode::Table => ViewMode::Grid,
      ViewMode::Grid => ViewMode::Table,
    }
  }
}

#[derive(Debug, Clone)]
pub struct ListState<F> {
  filters: F,
  pagination: PaginationParams,
  selection: BTreeSet<u64>,
  show_filters: bool,
  view_mode: ViewMode,
}

impl<F: SearchFilter> Default for ListState<F> {
  fn default() -> Self {
    Self::with_page_size(DEFAULT_PAGE_SIZE)
  }
}

impl<F: SearchFilter> ListState<F> {
  /// First page sorted by name, ascending.
  pub fn with_page_size(limit: u32) -> Self {
    Self {
      filters: F::default(),
      pagination: PaginationParams {
        page: 1,
        limit: limit.max(1),
        sort_by: Some("name".to_string()),
        sort_order: Some(SortOrder::Asc),
      },
      selection: BTreeSet::new(),
      show_filters: false,
      view_mode: ViewMode::default(),
    }
  }

  pub fn filters(&self) -> &F {
    &self.filters
  }

  pub fn pagination(&self) -> &PaginationParams {
    &self.pagination
  }

  pub fn selection(&self) -> &BTreeSet<u64> {
    &self.selection
  }

  pub fn show_filters(&self) -> bool {
    self.show_filters
  }

  pub fn view_mode(&self) -> ViewMode {
    self.view_mode
  }

  // --------------------------------------------------------------------------
  // Filters; every change goes back to the first page
  // --------------------------------------------------------------------------

  pub fn set_filters(&mut self, filters: F) {
    self.filters = filters;
    self.pagination.page = 1;
  }

  /// Edit the current filters in place.
  pub fn update_filters(&mut self, f: impl FnOnce(&mut F)) {
    f(&mut self.filters);
    self.pagination.page = 1;
  }

  pub fn clear_filters(&mut self) {
    self.set_filters(F::default());
  }

  /// Blank queries clear the search.
  pub fn set_search(&mut self, query: &str) {
    let query = query.trim();
    self.update_filters(|f| {
      f.set_search((!query.is_empty()).then(|| query.to_string()))
    });
  }

  pub fn toggle_filters(&mut self) {
    self.show_filters = !self.show_filters;
  }

  // --------------------------------------------------------------------------
  // Pagination
  // --------------------------------------------------------------------------

  pub fn set_page(&mut self, page: u32) {
    self.pagination.page = page.max(1);
  }

  pub fn next_page(&mut self, total_pages: u32) {
    if self.pagination.page < total_pages {
      self.pagination.page += 1;
    }
  }

  pub fn prev_page(&mut self) {
    self.set_page(self.pagination.page.saturating_sub(1));
  }

  pub fn set_page_size(&mut self, limit: u32) {
    self.pagination.limit = limit.max(1);
    self.pagination.page = 1;
  }

  /// Same field again flips the order; a new field starts ascending.
  pub fn sort_by(&mut self, field: &str) {
    let order = match (&self.pagination.sort_by, self.pagination.sort_order) {
      (Some(current), Some(SortOrder::Asc)) if current == field => SortOrder::Desc,
      _ => SortOrder::Asc,
    };
    self.pagination.sort_by = Some(field.to_string());
    self.pagination.sort_order = Some(order);
  }

  // --------------------------------------------------------------------------
  // Selection
  // --------------------------------------------------------------------------

  /// Flip membership of `id`. Returns whether it is now selected.
  pub fn toggle(&mut self, id: u64) -> bool {
    if self.selection.remove(&id) {
      false
    } else {
      self.selection.insert(id);
      true
    }
  }

  pub fn is_selected(&self, id: u64) -> bool {
    self.selection.contains(&id)
  }

  pub fn select_all(&mut self, ids: impl IntoIterator<Item = u64>) {
    self.selection.extend(ids);
  }

  pub fn clear_selection(&mut self) {
    self.selection.clear();
  }

  /// Selected ids, for bulk operations.
  pub fn selected_ids(&self) -> Vec<u64> {
    self.selection.iter().copied().collect()
  }

  pub fn set_view_mode(&mut self, mode: ViewMode) {
    self.view_mode = mode;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_double_toggle_restores_selection() {
    let mut state = ListState::<ItemFilters>::default();
    state.select_all([1, 2]);
    let before = state.selection().clone();

    assert!(state.toggle(5));
    assert!(state.is_selected(5));
    assert!(!state.toggle(5));

    assert_eq!(state.selection(), &before);
  }

  #[test]
  fn test_filter_changes_reset_page() {
    let mut state = ListState::<ItemFilters>::default();
    state.set_page(4);
    state.set_filters(ItemFilters {
      category_id: Some(3),
      ..Default::default()
    });
    assert_eq!(state.pagination().page, 1);

    state.set_page(2);
    state.set_search("  desk ");
    assert_eq!(state.pagination().page, 1);
    assert_eq!(state.filters().search(), Some("desk"));
    assert_eq!(state.filters().category_id, Some(3));

    state.set_page(3);
    state.clear_filters();
    assert_eq!(state.pagination().page, 1);
    assert_eq!(state.filters(), &ItemFilters::default());
  }

  #[test]
  fn test_blank_search_clears_query() {
    let mut state = ListState::<SupplierFilters>::default();
    state.set_search("acme");
    state.set_search("   ");
    assert_eq!(state.filters().search(), None);
  }

  #[test]
  fn test_pagination_bounds() {
    let mut state = ListState::<CategoryFilters>::with_page_size(0);
    assert_eq!(state.pagination().limit, 1);

    state.prev_page();
    assert_eq!(state.pagination().page, 1);

    state.next_page(2);
    state.next_page(2);
    assert_eq!(state.pagination().page, 2);

    state.set_page_size(50);
    assert_eq!(state.pagination().page, 1);
    assert_eq!(state.pagination().limit, 50);
  }

  #[test]
  fn test_sort_toggles_order() {
    let mut state = ListState::<ItemFilters>::default();
    state.sort_by("name");
    assert_eq!(state.pagination().sort_order, Some(SortOrder::Desc));
    state.sort_by("price");
    assert_eq!(state.pagination().sort_by.as_deref(), Some("price"));
    assert_eq!(state.pagination().sort_order, Some(SortOrder::Asc));
  }

  #[test]
  fn test_clear_selection_and_view_mode() {
    let mut state = ListState::<ItemFilters>::default();
    state.select_all([3, 1, 2]);
    assert_eq!(state.selected_ids(), vec![1, 2, 3]);
    state.clear_selection();
    assert!(state.selection().is_empty());

    state.toggle_filters();
    assert!(state.show_filters());
    state.set_view_mode(state.view_mode().toggled());
    assert_eq!(state.view_mode(), ViewMode::Grid);
  }
}
