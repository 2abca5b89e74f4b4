//! The page-facing side of the platform: open clients and notifications.

use url::Url;

use crate::control::Notification;

/// Capabilities the worker needs from whatever hosts it.
pub trait ClientHost: Send + Sync + 'static {
  /// Take control of every open page without waiting for a reload.
  fn claim(&self);

  /// Show a notification to the user.
  fn show_notification(&self, notification: &Notification);

  /// Focus an open page at `url`, or open a new one.
  fn open_or_focus(&self, url: &Url);
}

/// Host for headless runs: every request is logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHost;

impl ClientHost for LogHost {
  fn claim(&self) {
    tracing::info!("Claimed open clients");
  }

  fn show_notification(&self, notification: &Notification) {
    tracing::info!(
      title = %notification.title,
      body = %notification.body,
      actions = notification.actions.len(),
      "Notification shown"
    );
  }

  fn open_or_focus(&self, url: &Url) {
    tracing::info!(%url, "Open or focus client");
  }
}
