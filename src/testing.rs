//! Scripted platform doubles shared by the unit tests.

use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use url::Url;

use crate::cache::Snapshot;
use crate::control::Notification;
use crate::error::FetchError;
use crate::host::ClientHost;
use crate::network::Fetcher;
use crate::request::Request;

/// Fetcher answering from a route table. Unknown URLs get a 404.
#[derive(Default)]
pub struct MockFetcher {
  routes: Mutex<HashMap<String, Snapshot>>,
  unreachable: Mutex<HashSet<String>>,
  offline: AtomicBool,
  calls: Mutex<Vec<(String, String)>>,
}

impl MockFetcher {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn respond(&self, url: &str, status: u16, body: &str) {
    let snapshot = Snapshot::new(
      status,
      vec![("content-type".to_string(), "text/plain".to_string())],
      body,
    );
    self.routes.lock().unwrap().insert(url.to_string(), snapshot);
  }

  /// Make a single URL fail at the transport level.
  pub fn fail(&self, url: &str) {
    self.unreachable.lock().unwrap().insert(url.to_string());
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  /// Number of fetches issued for `url`.
  pub fn calls_to(&self, url: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|(_, u)| u == url)
      .count()
  }

  /// Every fetch as `(method, url)`, in issue order.
  pub fn calls(&self) -> Vec<(String, String)> {
    self.calls.lock().unwrap().clone()
  }
}

impl Fetcher for MockFetcher {
  fn fetch(&self, request: &Request) -> BoxFuture<'static, Result<Snapshot, FetchError>> {
    let url = request.url.to_string();
    self
      .calls
      .lock()
      .unwrap()
      .push((request.method.clone(), url.clone()));

    let result = if self.offline.load(Ordering::SeqCst)
      || self.unreachable.lock().unwrap().contains(&url)
    {
      Err(FetchError::Unreachable(url))
    } else {
      let snapshot = self
        .routes
        .lock()
        .unwrap()
        .get(&url)
        .cloned()
        .map(|mut s| {
          s.captured_at = chrono::Utc::now();
          s
        })
        .unwrap_or_else(|| Snapshot::new(404, Vec::new(), "not found"));
      Ok(snapshot)
    };

    async move {
      tokio::task::yield_now().await;
      result
    }
    .boxed()
  }
}

/// Host that records what the worker asked of it.
#[derive(Default)]
pub struct RecordingHost {
  pub claims: Mutex<usize>,
  pub notifications: Mutex<Vec<Notification>>,
  pub opened: Mutex<Vec<Url>>,
}

impl RecordingHost {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }
}

impl ClientHost for RecordingHost {
  fn claim(&self) {
    *self.claims.lock().unwrap() += 1;
  }

  fn show_notification(&self, notification: &Notification) {
    self.notifications.lock().unwrap().push(notification.clone());
  }

  fn open_or_focus(&self, url: &Url) {
    self.opened.lock().unwrap().push(url.clone());
  }
}
