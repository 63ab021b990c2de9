//! Wire shapes shared by every endpoint: the response envelope, paginated
//! pages, pagination parameters, and the import/export payloads.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use super::error::{field_errors_from, ApiError};

/// Uniform success envelope. Every gateway call resolves to one of these,
/// whether or not the backend wrapped its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
  pub success: bool,
  pub data: T,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
}

impl<T> Envelope<T> {
  pub fn ok(data: T) -> Self {
    Self {
      success: true,
      data,
      message: None,
    }
  }
}

#[derive(Debug, Deserialize)]
struct RawEnvelope {
  success: bool,
  #[serde(default)]
  data: Value,
  message: Option<String>,
  errors: Option<Value>,
}

/// Normalize a decoded 2xx body into an envelope.
///
/// A JSON object carrying both `success` and `data` is treated as already
/// wrapped; anything else (arrays, bare objects, `null` for empty bodies) is
/// the payload itself.
pub fn normalize<T: DeserializeOwned>(body: Value) -> Result<Envelope<T>, ApiError> {
  let wrapped = matches!(&body, Value::Object(map) if map.contains_key("success") && map.contains_key("data"));
  if !wrapped {
    return Ok(Envelope::ok(serde_json::from_value(body)?));
  }

  let raw: RawEnvelope = serde_json::from_value(body)?;
  if !raw.success {
    return Err(ApiError::Rejected {
      message: raw.message,
      errors: raw.errors.as_ref().and_then(field_errors_from),
    });
  }

  Ok(Envelope {
    success: true,
    data: serde_json::from_value(raw.data)?,
    message: raw.message,
  })
}

// ============================================================================
// Pagination
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
  #[default]
  Asc,
  Desc,
}

impl SortOrder {
  pub fn as_str(&self) -> &'static str {
    match self {
      SortOrder::Asc => "asc",
      SortOrder::Desc => "desc",
    }
  }
}

/// Requested page. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationParams {
  pub page: u32,
  pub limit: u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sort_by: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub sort_order: Option<SortOrder>,
}

impl Default for PaginationParams {
  fn default() -> Self {
    Self {
      page: 1,
      limit: 10,
      sort_by: None,
      sort_order: None,
    }
  }
}

impl PaginationParams {
  pub fn page(page: u32, limit: u32) -> Self {
    Self {
      page,
      limit,
      ..Self::default()
    }
  }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
  pub data: Vec<T>,
  pub total: u64,
  pub page: u32,
  pub limit: u32,
  pub total_pages: u32,
}

impl<T> Paginated<T> {
  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

// ============================================================================
// Import / export
// ============================================================================

/// Result of a bulk import: rows imported plus one message per rejected row.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImportReport {
  pub imported: u32,
  #[serde(default)]
  pub errors: Vec<String>,
}

/// Where to download a generated export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRef {
  pub download_url: String,
}

/// Response of an image upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
  pub image_url: String,
}
