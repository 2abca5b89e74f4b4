//! Core traits and types for the tiered response cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::StoreError;
use crate::request::Request;

/// Key under which a response is stored: method plus absolute URL (query included).
///
/// Only `GET` requests ever become keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(String);

impl RequestKey {
  /// Key for a request, or `None` for anything that isn't a `GET`.
  pub fn for_request(request: &Request) -> Option<Self> {
    if !request.is_get() {
      return None;
    }
    Some(Self::get(&request.url))
  }

  /// Key of a `GET` for `url`.
  pub fn get(url: &url::Url) -> Self {
    Self(format!("GET {}", url))
  }

  /// Rebuild a key from its stored form.
  pub fn from_stored(raw: String) -> Self {
    Self(raw)
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// A captured HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub captured_at: DateTime<Utc>,
}

impl Snapshot {
  pub fn new(status: u16, headers: Vec<(String, String)>, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers,
      body: body.into(),
      captured_at: Utc::now(),
    }
  }

  /// 2xx
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Content digest over status, headers and body. Ignores the capture time.
  pub fn digest(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.status.to_be_bytes());
    for (name, value) in &self.headers {
      hasher.update(name.to_ascii_lowercase().as_bytes());
      hasher.update(b":");
      hasher.update(value.as_bytes());
      hasher.update(b"\n");
    }
    hasher.update(&self.body);
    hex::encode(hasher.finalize())
  }
}

/// The two cache partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TierKind {
  /// App shell and core assets
  Static,
  /// Tiles and everything else fetched at runtime
  Dynamic,
}

/// Generation-qualified tier names for one worker version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierNames {
  pub static_name: String,
  pub dynamic_name: String,
}

impl TierNames {
  pub fn for_version(version: &str) -> Self {
    Self {
      static_name: format!("static-{}", version),
      dynamic_name: format!("dynamic-{}", version),
    }
  }

  pub fn name(&self, kind: TierKind) -> &str {
    match kind {
      TierKind::Static => &self.static_name,
      TierKind::Dynamic => &self.dynamic_name,
    }
  }

  /// Whether `name` belongs to this generation.
  pub fn is_current(&self, name: &str) -> bool {
    name == self.static_name || name == self.dynamic_name
  }
}

/// Trait for persistent key/response stores partitioned into named tiers.
///
/// Every operation is atomic per key; concurrent writes to the same key are
/// last-writer-wins.
pub trait CacheStorage: Send + Sync {
  /// Create the tier if it doesn't exist yet.
  fn open_tier(&self, tier: &str) -> Result<(), StoreError>;

  /// Names of all existing tiers.
  fn tier_names(&self) -> Result<Vec<String>, StoreError>;

  /// Drop a tier and all of its entries. Returns whether it existed.
  fn delete_tier(&self, tier: &str) -> Result<bool, StoreError>;

  fn get(&self, tier: &str, key: &RequestKey) -> Result<Option<Snapshot>, StoreError>;

  /// Insert or overwrite an entry, creating the tier on demand.
  fn put(&self, tier: &str, key: &RequestKey, snapshot: &Snapshot) -> Result<(), StoreError>;

  /// Write a batch of entries atomically: either all land or none do.
  fn put_all(&self, tier: &str, entries: &[(RequestKey, Snapshot)]) -> Result<(), StoreError>;

  /// Remove one entry. Returns whether it existed.
  fn delete(&self, tier: &str, key: &RequestKey) -> Result<bool, StoreError>;

  /// Keys of a tier in insertion order.
  fn keys(&self, tier: &str) -> Result<Vec<RequestKey>, StoreError>;
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  #[test]
  fn test_only_get_requests_have_keys() {
    let url = Url::parse("http://localhost/api/v1/search?q=park").unwrap();
    let key = RequestKey::for_request(&Request::get(url.clone())).unwrap();
    assert_eq!(key.as_str(), "GET http://localhost/api/v1/search?q=park");

    assert!(RequestKey::for_request(&Request::new("POST", url)).is_none());
  }

  #[test]
  fn test_tier_names_embed_version() {
    let names = TierNames::for_version("v2");
    assert_eq!(names.name(TierKind::Static), "static-v2");
    assert_eq!(names.name(TierKind::Dynamic), "dynamic-v2");
    assert!(names.is_current("dynamic-v2"));
    assert!(!names.is_current("static-v1"));
  }

  #[test]
  fn test_digest_ignores_capture_time() {
    let a = Snapshot::new(200, vec![("Content-Type".into(), "text/css".into())], "body{}");
    let mut b = a.clone();
    b.captured_at = a.captured_at + chrono::Duration::hours(1);
    assert_eq!(a.digest(), b.digest());

    b.body = b"p{}".to_vec();
    assert_ne!(a.digest(), b.digest());
  }

  #[test]
  fn test_success_range() {
    assert!(Snapshot::new(204, Vec::new(), "").is_success());
    assert!(!Snapshot::new(304, Vec::new(), "").is_success());
    assert!(!Snapshot::new(503, Vec::new(), "").is_success());
  }
}
