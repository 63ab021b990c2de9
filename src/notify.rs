//! User-visible notifications raised by mutations.

use std::fmt;
use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
  Success,
  Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub level: NotificationLevel,
  pub message: String,
}

impl Notification {
  pub fn success(message: impl Into<String>) -> Self {
    Self {
      level: NotificationLevel::Success,
      message: message.into(),
    }
  }

  pub fn error(message: impl Into<String>) -> Self {
    Self {
      level: NotificationLevel::Error,
      message: message.into(),
    }
  }

  pub fn is_error(&self) -> bool {
    self.level == NotificationLevel::Error
  }
}

impl fmt::Display for Notification {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.level {
      NotificationLevel::Success => write!(f, "✓ {}", self.message),
      NotificationLevel::Error => write!(f, "✗ {}", self.message),
    }
  }
}

/// Sink for notifications. Must never fail or block.
pub trait Notifier: Send + Sync {
  fn notify(&self, notification: Notification);
}

/// Prints notifications for one-shot CLI commands.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
  fn notify(&self, notification: Notification) {
    if notification.is_error() {
      error!("{}", notification.message);
      eprintln!("{}", notification);
    } else {
      info!("{}", notification.message);
      println!("{}", notification);
    }
  }
}

/// Forwards notifications to an event loop.
pub struct ChannelNotifier {
  tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
  pub fn new(tx: mpsc::UnboundedSender<Notification>) -> Self {
    Self { tx }
  }
}

impl Notifier for ChannelNotifier {
  fn notify(&self, notification: Notification) {
    // The loop may have shut down already
    let _ = self.tx.send(notification);
  }
}

/// Keeps every notification for assertions.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingNotifier {
  seen: std::sync::Mutex<Vec<Notification>>,
}

#[cfg(test)]
impl RecordingNotifier {
  pub fn messages(&self) -> Vec<(NotificationLevel, String)> {
    self
      .seen
      .lock()
      .unwrap()
      .iter()
      .map(|n| (n.level, n.message.clone()))
      .collect()
  }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
  fn notify(&self, notification: Notification) {
    self.seen.lock().unwrap().push(notification);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_channel_notifier_forwards() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let notifier = ChannelNotifier::new(tx);

    notifier.notify(Notification::success("Supplier updated successfully"));
    let got = rx.recv().await.unwrap();
    assert_eq!(got.level, NotificationLevel::Success);
    assert_eq!(got.to_string(), "✓ Supplier updated successfully");
  }

  #[test]
  fn test_channel_notifier_survives_closed_loop() {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    ChannelNotifier::new(tx).notify(Notification::error("Failed to delete item"));
  }
}
