//! Message protocol with the foreground page, and the push surface.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::NotificationConfig;

/// Messages the page posts to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
  /// Activate a waiting worker immediately. No reply.
  SkipWaiting,
  /// Reply with the current static tier name.
  GetVersion,
  /// Queue an action for replay on reconnect. Replies with its id.
  QueueAction {
    method: String,
    url: Url,
    #[serde(default)]
    headers: Vec<(String, String)>,
    #[serde(default)]
    body: Option<String>,
  },
  /// Drop a queued action. Replies with whether it existed.
  CancelAction { id: i64 },
}

/// Replies sent back over a message's reply port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlReply {
  Version { version: String },
  Queued { id: i64 },
  Cancelled { cancelled: bool },
  Error { error: String },
}

/// A button on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

/// A notification to show for a push message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  pub actions: Vec<NotificationAction>,
}

/// Primary notification action: bring the app to the front.
pub const ACTION_EXPLORE: &str = "explore";
pub const ACTION_CLOSE: &str = "close";

impl Notification {
  /// Build the notification for a push; the payload text becomes the body.
  pub fn for_push(config: &NotificationConfig, payload: Option<&str>) -> Self {
    let body = payload
      .map(str::trim)
      .filter(|text| !text.is_empty())
      .unwrap_or(config.default_body.as_str())
      .to_string();

    Self {
      title: config.title.clone(),
      body,
      icon: config.icon.clone(),
      badge: config.badge.clone(),
      vibrate: config.vibrate.clone(),
      actions: vec![
        NotificationAction {
          action: ACTION_EXPLORE.to_string(),
          title: config.explore_title.clone(),
        },
        NotificationAction {
          action: ACTION_CLOSE.to_string(),
          title: config.close_title.clone(),
        },
      ],
    }
  }
}

/// What a notification click asks of the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  /// Open or focus the page at this URL
  OpenRoot(Url),
  /// Just dismiss the notification
  Dismiss,
}

/// Decide what a click on `action` (or the notification body, `None`) does.
pub fn on_notification_click(action: Option<&str>, root: &Url) -> ClickOutcome {
  match action {
    Some(ACTION_EXPLORE) => ClickOutcome::OpenRoot(root.clone()),
    _ => ClickOutcome::Dismiss,
  }
}
