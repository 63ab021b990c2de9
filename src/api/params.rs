//! Typed query-string parameters.
//!
//! Every filter record enumerates the fields it understands and renders them
//! as `(name, value)` pairs. Absent and blank values are never sent.

use super::envelope::PaginationParams;

pub trait QueryParams {
  fn query_pairs(&self) -> Vec<(&'static str, String)>;
}

/// Append `value` under `name` unless it is absent or renders to a blank string.
pub fn push<V: ToString>(pairs: &mut Vec<(&'static str, String)>, name: &'static str, value: Option<V>) {
  if let Some(v) = value {
    let s = v.to_string();
    if !s.trim().is_empty() {
      pairs.push((name, s));
    }
  }
}

/// Stable textual form of a parameter set, used in cache keys.
/// Pairs are sorted so field order never produces two keys for one query.
pub fn canonical(params: &impl QueryParams) -> String {
  let mut pairs = params.query_pairs();
  pairs.sort();
  pairs
    .into_iter()
    .map(|(k, v)| format!("{}={}", k, v))
    .collect::<Vec<_>>()
    .join("&")
}

impl QueryParams for PaginationParams {
  fn query_pairs(&self) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();
    push(&mut pairs, "page", Some(self.page));
    push(&mut pairs, "limit", Some(self.limit));
    push(&mut pairs, "sortBy", self.sort_by.as_deref());
    push(&mut pairs, "sortOrder", self.sort_order.map(|o| o.as_str()));
    pairs
  }
}

/// No parameters at all.
impl QueryParams for () {
  fn query_pairs(&self) -> Vec<(&'static str, String)> {
    Vec::new()
  }
}

impl<P: QueryParams> QueryParams for Option<P> {
  fn query_pairs(&self) -> Vec<(&'static str, String)> {
    self.as_ref().map(|p| p.query_pairs()).unwrap_or_default()
  }
}

impl<A: QueryParams, B: QueryParams> QueryParams for (A, B) {
  fn query_pairs(&self) -> Vec<(&'static str, String)> {
    let mut pairs = self.0.query_pairs();
    pairs.extend(self.1.query_pairs());
    pairs
  }
}

impl<P: QueryParams + ?Sized> QueryParams for &P {
  fn query_pairs(&self) -> Vec<(&'static str, String)> {
    (**self).query_pairs()
  }
}

/// Ad-hoc pairs for one-off endpoints (`search`, `isActive`, ...).
impl QueryParams for Vec<(&'static str, String)> {
  fn query_pairs(&self) -> Vec<(&'static str, String)> {
    self.clone()
  }
}
