//! View-level async data handle.
//!
//! A `Query<T>` owns the fetching logic for one piece of view state and
//! tracks its loading/success/error state. Fetches run on spawned tasks;
//! `refetch()` and dropping the query cancel the task in flight, so a view
//! never sees the result of a request it has moved on from. A cache fetch
//! underneath runs on its own task and still lands in the cache.
//!
//! # Example
//!
//! ```ignore
//! let items = backend.items.clone();
//! let mut query = Query::new(move || {
//!     let items = items.clone();
//!     async move { items.low_stock(&PaginationParams::default()).await }
//! });
//!
//! query.fetch();
//!
//! // In event loop tick
//! if query.poll() {
//!     // State changed, redraw
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::error::ApiError;

/// The state of a query
#[derive(Debug, Clone)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// Query is currently fetching data
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed with an error
  Error(ApiError),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send>>;

type FetcherFn<T> = Box<dyn Fn() -> BoxFuture<T> + Send + Sync>;

struct Pending<T> {
  receiver: mpsc::UnboundedReceiver<Result<T, ApiError>>,
  cancel: CancellationToken,
}

/// Async query with state management.
pub struct Query<T> {
  state: QueryState<T>,
  fetcher: FetcherFn<T>,
  pending: Option<Pending<T>>,
}

impl<T: Send + 'static> Query<T> {
  /// Create a new query with the given fetcher function.
  ///
  /// The fetcher is called each time `fetch()` or `refetch()` starts a
  /// request.
  pub fn new<F, Fut>(fetcher: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
  {
    Self {
      state: QueryState::Idle,
      fetcher: Box::new(move || Box::pin(fetcher())),
      pending: None,
    }
  }

  pub fn state(&self) -> &QueryState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  /// Start fetching unless already loading.
  pub fn fetch(&mut self) {
    if self.state.is_loading() {
      return;
    }
    self.start_fetch();
  }

  /// Cancel any fetch in flight and start a new one.
  pub fn refetch(&mut self) {
    self.cancel();
    self.start_fetch();
  }

  /// Stop the fetch in flight, if any. Loading goes back to idle.
  pub fn cancel(&mut self) {
    if let Some(pending) = self.pending.take() {
      pending.cancel.cancel();
      if self.state.is_loading() {
        self.state = QueryState::Idle;
      }
    }
  }

  /// Poll for results from a pending fetch without blocking.
  ///
  /// Returns `true` if the state changed. Call this in the event loop tick.
  pub fn poll(&mut self) -> bool {
    let Some(pending) = &mut self.pending else {
      return false;
    };

    match pending.receiver.try_recv() {
      Ok(result) => {
        self.apply(result);
        true
      }
      Err(mpsc::error::TryRecvError::Empty) => false,
      Err(mpsc::error::TryRecvError::Disconnected) => {
        self.apply(Err(ApiError::Cancelled));
        true
      }
    }
  }

  /// Wait for the pending fetch, if any, and apply its result.
  ///
  /// Returns `true` if the state changed.
  pub async fn settled(&mut self) -> bool {
    let Some(pending) = &mut self.pending else {
      return false;
    };
    let result = pending
      .receiver
      .recv()
      .await
      .unwrap_or(Err(ApiError::Cancelled));
    self.apply(result);
    true
  }

  fn apply(&mut self, result: Result<T, ApiError>) {
    self.pending = None;
    self.state = match result {
      Ok(data) => QueryState::Success(data),
      Err(error) => QueryState::Error(error),
    };
  }

  fn start_fetch(&mut self) {
    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    self.pending = Some(Pending {
      receiver: rx,
      cancel: cancel.clone(),
    });
    self.state = QueryState::Loading;

    let future = (self.fetcher)();
    tokio::spawn(async move {
      tokio::select! {
        _ = cancel.cancelled() => {}
        result = future => {
          // Receiver may be gone
          let _ = tx.send(result);
        }
      }
    });
  }
}

impl<T> Drop for Query<T> {
  fn drop(&mut self) {
    if let Some(pending) = &self.pending {
      pending.cancel.cancel();
    }
  }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Query<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Query")
      .field("state", &self.state)
      .finish_non_exhaustive()
  }
}
