//! Injectable session context: bearer token and selected tenant ("firm").
//!
//! The gateway reads headers from here on every request and clears it on
//! 401. When backed by a [`LocalStore`] every change is written through so
//! the next process start picks it up again.

use color_eyre::Result;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::db::{LocalStore, AUTH_TOKEN_KEY, FIRM_ID_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
  /// No token
  Anonymous,
  Authenticated,
  /// The backend rejected the token; the user has to sign in again
  LoginRequired,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
  pub token: Option<String>,
  pub firm_id: Option<String>,
}

pub struct SessionContext {
  state: RwLock<SessionState>,
  store: Option<Arc<LocalStore>>,
  status: watch::Sender<SessionStatus>,
}

impl SessionContext {
  /// Session that lives only as long as the process
  pub fn in_memory(state: SessionState) -> Self {
    let status = status_of(&state);
    Self {
      state: RwLock::new(state),
      store: None,
      status: watch::channel(status).0,
    }
  }

  /// Rehydrate from the local store and write every change back to it.
  pub fn persistent(store: Arc<LocalStore>) -> Result<Self> {
    let state = SessionState {
      token: store.get(AUTH_TOKEN_KEY)?,
      firm_id: store.get(FIRM_ID_KEY)?,
    };
    let status = status_of(&state);
    Ok(Self {
      state: RwLock::new(state),
      store: Some(store),
      status: watch::channel(status).0,
    })
  }

  fn read(&self) -> RwLockReadGuard<'_, SessionState> {
    self.state.read().unwrap_or_else(|e| e.into_inner())
  }

  fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
    self.state.write().unwrap_or_else(|e| e.into_inner())
  }

  pub fn token(&self) -> Option<String> {
    self.read().token.clone()
  }

  pub fn firm_id(&self) -> Option<String> {
    self.read().firm_id.clone()
  }

  pub fn snapshot(&self) -> SessionState {
    self.read().clone()
  }

  pub fn status(&self) -> SessionStatus {
    *self.status.borrow()
  }

  /// Watch status changes, e.g. to redirect to a login prompt.
  pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
    self.status.subscribe()
  }

  pub fn set_token(&self, token: impl Into<String>) -> Result<()> {
    let token = token.into();
    if let Some(store) = &self.store {
      store.set(AUTH_TOKEN_KEY, &token)?;
    }
    self.write().token = Some(token);
    self.status.send_replace(SessionStatus::Authenticated);
    Ok(())
  }

  /// Select the tenant. Returns whether it changed.
  pub fn set_firm(&self, firm_id: Option<String>) -> Result<bool> {
    if self.firm_id() == firm_id {
      return Ok(false);
    }
    if let Some(store) = &self.store {
      match &firm_id {
        Some(id) => store.set(FIRM_ID_KEY, id)?,
        None => store.remove(FIRM_ID_KEY)?,
      }
    }
    self.write().firm_id = firm_id;
    Ok(true)
  }

  /// Sign out: forget token and tenant.
  pub fn clear(&self) -> Result<()> {
    if let Some(store) = &self.store {
      store.remove(AUTH_TOKEN_KEY)?;
      store.remove(FIRM_ID_KEY)?;
    }
    *self.write() = SessionState::default();
    self.status.send_replace(SessionStatus::Anonymous);
    Ok(())
  }

  /// Called by the gateway on HTTP 401. Never fails; a store error is logged.
  pub fn clear_for_unauthorized(&self) {
    info!("Session rejected by backend, clearing credentials");
    if let Some(store) = &self.store {
      if let Err(e) = store
        .remove(AUTH_TOKEN_KEY)
        .and_then(|_| store.remove(FIRM_ID_KEY))
      {
        warn!("Failed to clear stored session: {}", e);
      }
    }
    *self.write() = SessionState::default();
    self.status.send_replace(SessionStatus::LoginRequired);
  }
}

impl Default for SessionContext {
  fn default() -> Self {
    Self::in_memory(SessionState::default())
  }
}

fn status_of(state: &SessionState) -> SessionStatus {
  if state.token.is_some() {
    SessionStatus::Authenticated
  } else {
    SessionStatus::Anonymous
  }
}
