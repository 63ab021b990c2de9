use std::io::BufRead;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

use crate::cache::CacheEvent;
use crate::notify::Notification;
use crate::session::SessionStatus;

/// Application events
#[derive(Debug, Clone)]
pub enum Event {
  /// Periodic tick for query polling and refresh
  Tick,
  /// A cache entry changed
  Cache(CacheEvent),
  /// Session status changed, e.g. the token was rejected
  Session(SessionStatus),
  /// Outcome of a mutation, for display
  Notice(Notification),
  /// A line typed by the user
  Input(String),
  /// Ctrl-C
  Interrupt,
}

/// Merges ticks, cache events, session changes, notifications and typed input
/// into one stream.
pub struct EventHandler {
  tx: mpsc::UnboundedSender<Event>,
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    let ticks = tx.clone();
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(tick_rate);
      interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
      loop {
        interval.tick().await;
        if ticks.send(Event::Tick).is_err() {
          break;
        }
      }
    });

    let interrupts = tx.clone();
    tokio::spawn(async move {
      if tokio::signal::ctrl_c().await.is_ok() {
        let _ = interrupts.send(Event::Interrupt);
      }
    });

    Self { tx, rx }
  }

  pub fn forward_cache(&self, mut events: broadcast::Receiver<CacheEvent>) {
    let tx = self.tx.clone();
    tokio::spawn(async move {
      loop {
        match events.recv().await {
          Ok(event) => {
            if tx.send(Event::Cache(event)).is_err() {
              break;
            }
          }
          Err(broadcast::error::RecvError::Lagged(n)) => {
            warn!("Dropped {} cache events", n);
          }
          Err(broadcast::error::RecvError::Closed) => break,
        }
      }
    });
  }

  pub fn forward_session(&self, mut status: watch::Receiver<SessionStatus>) {
    let tx = self.tx.clone();
    tokio::spawn(async move {
      while status.changed().await.is_ok() {
        let current = *status.borrow_and_update();
        debug!("Session status: {:?}", current);
        if tx.send(Event::Session(current)).is_err() {
          break;
        }
      }
    });
  }

  pub fn forward_notices(&self, mut notices: mpsc::UnboundedReceiver<Notification>) {
    let tx = self.tx.clone();
    tokio::spawn(async move {
      while let Some(notice) = notices.recv().await {
        if tx.send(Event::Notice(notice)).is_err() {
          break;
        }
      }
    });
  }

  /// Forward each line of `input` as [`Event::Input`].
  ///
  /// Reads on a plain thread: a blocking read of stdin cannot be cancelled and
  /// must not hold up runtime shutdown.
  pub fn forward_lines(&self, input: impl BufRead + Send + 'static) {
    let tx = self.tx.clone();
    std::thread::spawn(move || {
      for line in input.lines() {
        match line {
          Ok(line) => {
            if tx.send(Event::Input(line)).is_err() {
              break;
            }
          }
          Err(e) => {
            warn!("Cannot read input: {}", e);
            break;
          }
        }
      }
    });
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
