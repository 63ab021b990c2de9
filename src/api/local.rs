//! Client-side pagination for endpoints that only return the full collection.

use super::envelope::{Paginated, PaginationParams};

/// Page size used when a caller asks for a limit of zero.
pub const DEFAULT_LIMIT: u32 = 10;

/// Slice one page out of `data`.
///
/// `total_pages` is `ceil(total / limit)`, so an empty input gives a page
/// with `total = 0` and `total_pages = 0`. Pages past the end are empty.
pub fn paginate<T>(data: Vec<T>, pagination: &PaginationParams) -> Paginated<T> {
  let page = pagination.page.max(1);
  let limit = if pagination.limit == 0 {
    DEFAULT_LIMIT
  } else {
    pagination.limit
  };

  let total = data.len() as u64;
  let total_pages = total.div_ceil(limit as u64) as u32;
  let start = ((page - 1) as usize).saturating_mul(limit as usize);

  let data = data
    .into_iter()
    .skip(start)
    .take(limit as usize)
    .collect();

  Paginated {
    data,
    total,
    page,
    limit,
    total_pages,
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_middle_page() {
    let page = paginate((1..=25).collect(), &PaginationParams::page(2, 10));
    assert_eq!(page.data, (11..=20).collect::<Vec<_>>());
    assert_eq!(page.total, 25);
    assert_eq!(page.total_pages, 3);
  }

  #[test]
  fn test_last_partial_page() {
    let page = paginate((1..=25).collect(), &PaginationParams::page(3, 10));
    assert_eq!(page.data, vec![21, 22, 23, 24, 25]);
  }

  #[test]
  fn test_empty_input() {
    let page = paginate(Vec::<u32>::new(), &PaginationParams::page(1, 20));
    assert!(page.is_empty());
    assert_eq!(page.total, 0);
    assert_eq!(page.total_pages, 0);
  }

  #[test]
  fn test_zero_page_and_limit_fall_back() {
    let page = paginate((1..=3).collect(), &PaginationParams::page(0, 0));
    assert_eq!(page.page, 1);
    assert_eq!(page.limit, DEFAULT_LIMIT);
    assert_eq!(page.data, vec![1, 2, 3]);
    assert_eq!(page.total_pages, 1);
  }

  #[test]
  fn test_page_past_the_end() {
    let page = paginate((1..=3).collect(), &PaginationParams::page(9, 2));
    assert!(page.is_empty());
    assert_eq!(page.total, 3);
    assert_eq!(page.total_pages, 2);
  }
}
