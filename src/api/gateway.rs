//! Request gateway: the single place that talks HTTP to the backend.

use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::envelope::{normalize, Envelope};
use super::error::ApiError;
use super::params::QueryParams;
use crate::config::ApiConfig;
use crate::session::SessionContext;

/// Header carrying the selected tenant
pub const FIRM_HEADER: &str = "X-Firm-Id";

/// Upload bodies are streamed in chunks of this size; progress is reported per chunk.
const UPLOAD_CHUNK: usize = 64 * 1024;

/// Large imports can take a while to be processed server-side
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Upload progress callback, called with whole percentages 0-100.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Per-request options.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
  pub query: Vec<(&'static str, String)>,
  /// Overrides the client-wide timeout
  pub timeout: Option<Duration>,
}

impl RequestOptions {
  pub fn query(params: &impl QueryParams) -> Self {
    Self {
      query: params.query_pairs(),
      timeout: None,
    }
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }
}

/// A file to send as `multipart/form-data`.
#[derive(Debug, Clone)]
pub struct UploadFile {
  pub file_name: String,
  pub mime: String,
  pub data: Vec<u8>,
}

impl UploadFile {
  pub fn new(file_name: impl Into<String>, data: Vec<u8>) -> Self {
    let file_name = file_name.into();
    let mime = mime_for(&file_name).to_string();
    Self {
      file_name,
      mime,
      data,
    }
  }

  pub async fn from_path(path: &Path) -> Result<Self, ApiError> {
    let data = tokio::fs::read(path)
      .await
      .map_err(|e| ApiError::InvalidRequest(format!("cannot read {}: {}", path.display(), e)))?;
    let file_name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_else(|| "upload".to_string());
    Ok(Self::new(file_name, data))
  }
}

fn mime_for(file_name: &str) -> &'static str {
  let ext = file_name
    .rsplit_once('.')
    .map(|(_, ext)| ext.to_ascii_lowercase())
    .unwrap_or_default();
  match ext.as_str() {
    "csv" => "text/csv",
    "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "xls" => "application/vnd.ms-excel",
    "json" => "application/json",
    "png" => "image/png",
    "jpg" | "jpeg" => "image/jpeg",
    "gif" => "image/gif",
    "webp" => "image/webp",
    _ => "application/octet-stream",
  }
}

/// HTTP gateway wrapper
#[derive(Clone)]
pub struct Gateway {
  client: Client,
  base_url: Url,
  session: Arc<SessionContext>,
}

impl Gateway {
  pub fn new(base_url: &str, timeout: Duration, session: Arc<SessionContext>) -> Result<Self, ApiError> {
    let base_url = Url::parse(base_url)
      .map_err(|e| ApiError::InvalidRequest(format!("invalid base url {}: {}", base_url, e)))?;

    let client = Client::builder()
      .timeout(timeout)
      .user_agent(concat!("bizdesk/", env!("CARGO_PKG_VERSION")))
      .build()?;

    Ok(Self {
      client,
      base_url,
      session,
    })
  }

  pub fn from_config(config: &ApiConfig, session: Arc<SessionContext>) -> Result<Self, ApiError> {
    Self::new(
      &config.base_url,
      Duration::from_secs(config.timeout_secs),
      session,
    )
  }

  pub fn session(&self) -> &Arc<SessionContext> {
    &self.session
  }

  /// Resolve `path` below the base url, keeping the base path prefix.
  fn url(&self, path: &str) -> Result<Url, ApiError> {
    let joined = format!(
      "{}/{}",
      self.base_url.as_str().trim_end_matches('/'),
      path.trim_start_matches('/')
    );
    Url::parse(&joined).map_err(|e| ApiError::InvalidRequest(format!("invalid path {}: {}", path, e)))
  }

  fn request(&self, method: Method, path: &str, options: &RequestOptions) -> Result<RequestBuilder, ApiError> {
    let mut req = self.client.request(method, self.url(path)?);

    if !options.query.is_empty() {
      req = req.query(&options.query);
    }
    if let Some(timeout) = options.timeout {
      req = req.timeout(timeout);
    }

    let session = self.session.snapshot();
    if let Some(token) = &session.token {
      req = req.bearer_auth(token);
    }
    if let Some(firm_id) = &session.firm_id {
      req = req.header(FIRM_HEADER, firm_id);
    }
    Ok(req)
  }

  /// Send one request and normalize its response.
  pub async fn send<T, B>(
    &self,
    method: Method,
    path: &str,
    body: Option<&B>,
    options: RequestOptions,
  ) -> Result<Envelope<T>, ApiError>
  where
    T: DeserializeOwned,
    B: Serialize + ?Sized,
  {
    debug!("{} {}", method, path);
    let mut req = self.request(method, path, &options)?;
    if let Some(body) = body {
      req = req.json(body);
    }
    let response = req.send().await?;
    self.finish(response).await
  }

  async fn finish<T: DeserializeOwned>(&self, response: Response) -> Result<Envelope<T>, ApiError> {
    let status = response.status();
    let body = response.text().await?;

    if status == reqwest::StatusCode::UNAUTHORIZED {
      warn!("Backend answered 401, signing out");
      self.session.clear_for_unauthorized();
    }
    if !status.is_success() {
      let err = ApiError::from_response(status, &body);
      debug!("Request failed: {}", err);
      return Err(err);
    }

    let value = if body.trim().is_empty() {
      Value::Null
    } else {
      serde_json::from_str(&body)?
    };
    normalize(value)
  }

  pub async fn get<T: DeserializeOwned>(&self, path: &str, params: &impl QueryParams) -> Result<Envelope<T>, ApiError> {
    self
      .send::<T, ()>(Method::GET, path, None, RequestOptions::query(params))
      .await
  }

  pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Envelope<T>, ApiError> {
    self
      .send(Method::POST, path, Some(body), RequestOptions::default())
      .await
  }

  pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Envelope<T>, ApiError> {
    self
      .send(Method::PUT, path, Some(body), RequestOptions::default())
      .await
  }

  pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Envelope<T>, ApiError> {
    self
      .send(Method::PATCH, path, Some(body), RequestOptions::default())
      .await
  }

  pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<Envelope<T>, ApiError> {
    self
      .send::<T, ()>(Method::DELETE, path, None, RequestOptions::default())
      .await
  }

  /// POST `file` as multipart form field `field`, reporting progress while
  /// the body is streamed out.
  pub async fn upload<T: DeserializeOwned>(
    &self,
    path: &str,
    field: &str,
    file: UploadFile,
    progress: Option<ProgressFn>,
  ) -> Result<Envelope<T>, ApiError> {
    let total = file.data.len() as u64;
    debug!("POST {} (multipart, {} bytes)", path, total);

    let chunks: Vec<Vec<u8>> = file.data.chunks(UPLOAD_CHUNK).map(<[u8]>::to_vec).collect();
    let stream_progress = progress.clone();
    let mut sent = 0u64;
    let mut last = None;
    let stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
      sent += chunk.len() as u64;
      let pct = percent(sent, total);
      if let Some(report) = &stream_progress {
        if last != Some(pct) {
          last = Some(pct);
          report(pct);
        }
      }
      Ok::<_, std::io::Error>(chunk)
    }));

    let part = Part::stream_with_length(Body::wrap_stream(stream), total)
      .file_name(file.file_name)
      .mime_str(&file.mime)?;
    let form = Form::new().part(field.to_string(), part);

    let response = self
      .request(Method::POST, path, &RequestOptions::default().with_timeout(UPLOAD_TIMEOUT))?
      .multipart(form)
      .send()
      .await?;

    if total == 0 {
      if let Some(report) = &progress {
        report(100);
      }
    }
    self.finish(response).await
  }
}

fn percent(sent: u64, total: u64) -> u8 {
  if total == 0 {
    return 100;
  }
  ((sent * 100 + total / 2) / total).min(100) as u8
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::session::{SessionState, SessionStatus};
  use httpmock::prelude::*;
  use httpmock::Method::{DELETE, GET, POST};
  use serde_json::json;
  use std::sync::Mutex;

  fn gateway(server: &MockServer, state: SessionState) -> Gateway {
    let session = Arc::new(SessionContext::in_memory(state));
    Gateway::new(&server.base_url(), Duration::from_secs(5), session).unwrap()
  }

  fn signed_in() -> SessionState {
    SessionState {
      token: Some("tok".into()),
      firm_id: Some("7".into()),
    }
  }

  #[tokio::test]
  async fn test_session_headers_are_attached() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
      when
        .method(GET)
        .path("/Item/1")
        .header("authorization", "Bearer tok")
        .header("x-firm-id", "7");
      then.status(200).json_body(json!({"id": 1}));
    });

    let env: Envelope<Value> = gateway(&server, signed_in())
      .get("/Item/1", &())
      .await
      .unwrap();

    assert_eq!(env.data, json!({"id": 1}));
    assert_eq!(mock.calls(), 1);
  }

  #[tokio::test]
  async fn test_query_params_are_sent() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
      when
        .method(GET)
        .path("/categories")
        .query_param("page", "2")
        .query_param("limit", "20");
      then
        .status(200)
        .json_body(json!({"success": true, "data": []}));
    });

    let env: Envelope<Vec<Value>> = gateway(&server, SessionState::default())
      .get(
        "categories",
        &crate::api::envelope::PaginationParams::page(2, 20),
      )
      .await
      .unwrap();

    assert!(env.data.is_empty());
    assert_eq!(mock.calls(), 1);
  }

  #[tokio::test]
  async fn test_unauthorized_clears_session() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method(GET).path("/Item");
      then.status(401).json_body(json!({"message": "Token expired"}));
    });

    let gw = gateway(&server, signed_in());
    let err = gw.get::<Value>("/Item", &()).await.unwrap_err();

    assert!(matches!(
      &err,
      ApiError::Unauthorized { message } if message.as_deref() == Some("Token expired")
    ));
    assert_eq!(gw.session().token(), None);
    assert_eq!(gw.session().firm_id(), None);
    assert_eq!(gw.session().status(), SessionStatus::LoginRequired);
  }

  #[tokio::test]
  async fn test_validation_errors_are_structured() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method(POST).path("/Item");
      then.status(400).json_body(json!({
        "title": "One or more validation errors occurred.",
        "errors": {"Name": ["The Name field is required."]}
      }));
    });

    let err = gateway(&server, signed_in())
      .post::<Value, _>("/Item", &json!({}))
      .await
      .unwrap_err();

    let fields = err.field_errors().unwrap();
    assert_eq!(fields["Name"], vec!["The Name field is required."]);
    assert_eq!(
      err.user_message("Failed to create item"),
      "One or more validation errors occurred."
    );
  }

  #[tokio::test]
  async fn test_not_found_and_server_errors() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method(GET).path("/Item/99");
      then.status(404);
    });
    server.mock(|when, then| {
      when.method(DELETE).path("/Item/5");
      then.status(500).body("<html>boom</html>");
    });

    let gw = gateway(&server, signed_in());
    let not_found = gw.get::<Value>("/Item/99", &()).await.unwrap_err();
    assert!(matches!(not_found, ApiError::NotFound { .. }));

    let server_error = gw.delete::<Value>("/Item/5").await.unwrap_err();
    assert!(matches!(server_error, ApiError::Status { status: 500, .. }));
    assert!(server_error.is_retryable());
  }

  #[tokio::test]
  async fn test_empty_body_is_success() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method(DELETE).path("/categories/3");
      then.status(204);
    });

    let env: Envelope<()> = gateway(&server, signed_in())
      .delete("/categories/3")
      .await
      .unwrap();
    assert!(env.success);
  }

  #[tokio::test]
  async fn test_connection_failure_is_transport_error() {
    let session = Arc::new(SessionContext::default());
    let gw = Gateway::new("http://127.0.0.1:1/api", Duration::from_secs(2), session).unwrap();

    let err = gw.get::<Value>("/Item", &()).await.unwrap_err();
    assert!(matches!(err, ApiError::Transport(_)));
  }

  #[tokio::test]
  async fn test_upload_reports_progress() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
      when.method(POST).path("/Item/1/image");
      then
        .status(200)
        .json_body(json!({"imageUrl": "/images/1.png"}));
    });

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let progress: ProgressFn = Arc::new(move |pct| sink.lock().unwrap().push(pct));

    let file = UploadFile::new("photo.png", vec![0u8; 200_000]);
    assert_eq!(file.mime, "image/png");

    let env: Envelope<Value> = gateway(&server, signed_in())
      .upload("/Item/1/image", "file", file, Some(progress))
      .await
      .unwrap();

    assert_eq!(env.data["imageUrl"], "/images/1.png");
    assert_eq!(mock.calls(), 1);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
  }

  #[test]
  fn test_percent() {
    assert_eq!(percent(0, 0), 100);
    assert_eq!(percent(50, 200), 25);
    assert_eq!(percent(200, 200), 100);
  }
}
