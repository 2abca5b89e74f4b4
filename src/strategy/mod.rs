//! Retrieval policies deciding whether a request is answered from cache or network.

mod cache_first;
mod network_first;

pub use cache_first::CacheFirst;
pub use network_first::NetworkFirst;

use crate::cache::{CacheStorage, RequestKey, Snapshot, TierKind, TierStore};

/// Body of the response synthesized for API calls that can't be served offline.
pub const OFFLINE_BODY: &str =
  r#"{"error":"Offline","message":"This request is not available offline"}"#;

/// The structured 503 returned for API calls with no network and no cached copy.
pub fn offline_response() -> Snapshot {
  Snapshot::new(
    503,
    vec![("Content-Type".to_string(), "application/json".to_string())],
    OFFLINE_BODY,
  )
}

/// The cached shell document, if the static tier has one.
fn offline_shell<S: CacheStorage>(tiers: &TierStore<S>, shell_key: &RequestKey) -> Option<Snapshot> {
  match tiers.get(TierKind::Static, shell_key) {
    Ok(shell) => shell,
    Err(e) => {
      tracing::warn!(error = %e, "Failed to read offline shell");
      None
    }
  }
}

/// A response produced by a strategy, with where it came from.
#[derive(Debug, Clone)]
pub struct Served {
  pub snapshot: Snapshot,
  pub source: ResponseSource,
}

impl Served {
  pub fn new(snapshot: Snapshot, source: ResponseSource) -> Self {
    Self { snapshot, source }
  }
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh data from network
  Network,
  /// Cache hit served ahead of the network (revalidated in the background)
  Cache,
  /// Network failed, serving the last stored copy
  StaleCache,
  /// Navigation failed, serving the cached app shell
  OfflineShell,
  /// Network failed and nothing was cached: synthesized offline error
  Offline,
}
