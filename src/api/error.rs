//! Typed errors surfaced by the request gateway and everything built on it.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Field name -> validation messages, as reported by the backend.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Longest raw body we are willing to show as an error message.
const BODY_PREVIEW_LIMIT: usize = 200;

/// Error taxonomy for every backend interaction.
///
/// `Clone` is required because one in-flight read can be shared by several
/// waiters, each of which receives its own copy of the outcome.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
  /// Connection, DNS, TLS or timeout failure before a response arrived
  #[error("network error: {0}")]
  Transport(String),

  /// HTTP 401; the session has already been cleared when this is returned
  #[error("{}", or_default(.message, "Your session has expired, please sign in again"))]
  Unauthorized { message: Option<String> },

  /// Structured per-field validation failure (400/422 with `errors`)
  #[error("{}", or_default(.message, "Validation failed"))]
  Validation {
    message: Option<String>,
    errors: FieldErrors,
  },

  /// HTTP 404
  #[error("{}", or_default(.message, "Resource not found"))]
  NotFound { message: Option<String> },

  /// Any other non-2xx status
  #[error("HTTP {status}: {}", status_message(.status, .message))]
  Status { status: u16, message: Option<String> },

  /// A 2xx response whose envelope says `success: false`
  #[error("{}", or_default(.message, "The request was rejected"))]
  Rejected {
    message: Option<String>,
    errors: Option<FieldErrors>,
  },

  /// The payload did not match the expected shape
  #[error("failed to decode response: {0}")]
  Decode(String),

  /// The caller went away before the request finished
  #[error("request cancelled")]
  Cancelled,

  /// The request could not be built (bad path, unreadable file, ...)
  #[error("invalid request: {0}")]
  InvalidRequest(String),
}

/// Error payload in the `{success:false, message, errors?}` shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
  pub success: bool,
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub errors: Option<FieldErrors>,
}

/// Loose view over whatever error body the backend sends: our own envelope,
/// an ASP.NET problem-details document, or something else entirely.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
  message: Option<String>,
  title: Option<String>,
  detail: Option<String>,
  errors: Option<Value>,
}

impl ApiError {
  /// Classify a non-2xx response.
  pub fn from_response(status: StatusCode, body: &str) -> Self {
    let parsed: Option<ErrorBody> = serde_json::from_str(body).ok();
    let (message, errors) = match parsed {
      Some(b) => {
        let message = [b.message, b.detail, b.title]
          .into_iter()
          .flatten()
          .find(|m| !m.trim().is_empty());
        (message, b.errors.as_ref().and_then(field_errors_from))
      }
      None => (raw_preview(body), None),
    };

    match status {
      StatusCode::UNAUTHORIZED => ApiError::Unauthorized { message },
      StatusCode::NOT_FOUND => ApiError::NotFound { message },
      StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY if errors.is_some() => {
        ApiError::Validation {
          message,
          errors: errors.unwrap_or_default(),
        }
      }
      _ => ApiError::Status {
        status: status.as_u16(),
        message,
      },
    }
  }

  /// Message extracted from the backend payload, if there was a usable one.
  pub fn payload_message(&self) -> Option<&str> {
    match self {
      ApiError::Unauthorized { message }
      | ApiError::Validation { message, .. }
      | ApiError::NotFound { message }
      | ApiError::Status { message, .. }
      | ApiError::Rejected { message, .. } => {
        message.as_deref().filter(|m| !m.trim().is_empty())
      }
      ApiError::Transport(_)
      | ApiError::Decode(_)
      | ApiError::Cancelled
      | ApiError::InvalidRequest(_) => None,
    }
  }

  /// Human-readable message for a notification: the payload message when the
  /// backend supplied one, otherwise `fallback`.
  pub fn user_message(&self, fallback: &str) -> String {
    self
      .payload_message()
      .map(String::from)
      .unwrap_or_else(|| fallback.to_string())
  }

  pub fn field_errors(&self) -> Option<&FieldErrors> {
    match self {
      ApiError::Validation { errors, .. } => Some(errors),
      ApiError::Rejected { errors, .. } => errors.as_ref(),
      _ => None,
    }
  }

  /// Reads may be retried on transport failures and server-side errors only.
  pub fn is_retryable(&self) -> bool {
    match self {
      ApiError::Transport(_) => true,
      ApiError::Status { status, .. } => *status >= 500,
      _ => false,
    }
  }

  pub fn to_envelope(&self) -> ErrorEnvelope {
    ErrorEnvelope {
      success: false,
      message: self
        .payload_message()
        .map(String::from)
        .unwrap_or_else(|| self.to_string()),
      errors: self.field_errors().cloned(),
    }
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      ApiError::Decode(e.to_string())
    } else if e.is_builder() {
      ApiError::InvalidRequest(e.to_string())
    } else {
      ApiError::Transport(e.to_string())
    }
  }
}

impl From<serde_json::Error> for ApiError {
  fn from(e: serde_json::Error) -> Self {
    ApiError::Decode(e.to_string())
  }
}

/// Accepts `{"Field": ["msg", ...]}`, `{"Field": "msg"}` or `["msg", ...]`.
pub(crate) fn field_errors_from(value: &Value) -> Option<FieldErrors> {
  let mut out = FieldErrors::new();
  match value {
    Value::Object(map) => {
      for (field, messages) in map {
        let messages: Vec<String> = match messages {
          Value::String(s) => vec![s.clone()],
          Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect(),
          _ => continue,
        };
        if !messages.is_empty() {
          out.insert(field.clone(), messages);
        }
      }
    }
    Value::Array(items) => {
      let messages: Vec<String> = items
        .iter()
        .filter_map(|v| v.as_str().map(String::from))
        .collect();
      if !messages.is_empty() {
        out.insert(String::new(), messages);
      }
    }
    _ => {}
  }
  (!out.is_empty()).then_some(out)
}

fn or_default<'a>(message: &'a Option<String>, default: &'a str) -> &'a str {
  message
    .as_deref()
    .filter(|m| !m.trim().is_empty())
    .unwrap_or(default)
}

fn status_message(status: &u16, message: &Option<String>) -> String {
  let reason = StatusCode::from_u16(*status)
    .ok()
    .and_then(|s| s.canonical_reason())
    .unwrap_or("Request failed");
  or_default(message, reason).to_string()
}

fn raw_preview(body: &str) -> Option<String> {
  let body = body.trim();
  if body.is_empty() || body.starts_with('<') {
    return None;
  }
  Some(body.chars().take(BODY_PREVIEW_LIMIT).collect())
}
