//! Static/dynamic tier pair bound to one worker version.

use std::sync::Arc;

use super::traits::{CacheStorage, RequestKey, Snapshot, TierKind, TierNames};
use crate::error::StoreError;

/// The two cache tiers of the current worker generation.
pub struct TierStore<S: CacheStorage> {
  storage: Arc<S>,
  names: TierNames,
}

impl<S: CacheStorage> TierStore<S> {
  pub fn new(storage: Arc<S>, version: &str) -> Self {
    Self {
      storage,
      names: TierNames::for_version(version),
    }
  }

  pub fn names(&self) -> &TierNames {
    &self.names
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  pub fn get(&self, kind: TierKind, key: &RequestKey) -> Result<Option<Snapshot>, StoreError> {
    self.storage.get(self.names.name(kind), key)
  }

  /// Store a snapshot. Returns whether the stored value changed.
  pub fn put(
    &self,
    kind: TierKind,
    key: &RequestKey,
    snapshot: &Snapshot,
  ) -> Result<bool, StoreError> {
    let tier = self.names.name(kind);
    let changed = match self.storage.get(tier, key)? {
      Some(previous) => previous.digest() != snapshot.digest(),
      None => true,
    };
    self.storage.put(tier, key, snapshot)?;
    tracing::trace!(%tier, %key, changed, "Stored snapshot");
    Ok(changed)
  }

  pub fn put_all(
    &self,
    kind: TierKind,
    entries: &[(RequestKey, Snapshot)],
  ) -> Result<(), StoreError> {
    self.storage.put_all(self.names.name(kind), entries)
  }

  pub fn delete(&self, kind: TierKind, key: &RequestKey) -> Result<bool, StoreError> {
    self.storage.delete(self.names.name(kind), key)
  }

  pub fn keys(&self, kind: TierKind) -> Result<Vec<RequestKey>, StoreError> {
    self.storage.keys(self.names.name(kind))
  }

  /// Create both current tiers if missing.
  pub fn open_current(&self) -> Result<(), StoreError> {
    self.storage.open_tier(&self.names.static_name)?;
    self.storage.open_tier(&self.names.dynamic_name)
  }

  /// Delete every tier that doesn't belong to this generation.
  ///
  /// Returns the names of the deleted tiers.
  pub fn evict_stale(&self) -> Result<Vec<String>, StoreError> {
    let mut evicted = Vec::new();
    for name in self.storage.tier_names()? {
      if self.names.is_current(&name) {
        continue;
      }
      if self.storage.delete_tier(&name)? {
        evicted.push(name);
      }
    }
    Ok(evicted)
  }
}

impl<S: CacheStorage> Clone for TierStore<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      names: self.names.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use crate::db::Database;
  use crate::request::Request;
  use url::Url;

  fn key(url: &str) -> RequestKey {
    RequestKey::for_request(&Request::get(Url::parse(url).unwrap())).unwrap()
  }

  fn storage() -> Arc<SqliteStorage> {
    Arc::new(SqliteStorage::new(Arc::new(Database::open_in_memory().unwrap())))
  }

  #[test]
  fn test_put_reports_changes() {
    let tiers = TierStore::new(storage(), "v1");
    let k = key("http://localhost/tiles/1/2/3.pbf");
    let snap = Snapshot::new(200, Vec::new(), vec![1, 2, 3]);

    assert!(tiers.put(TierKind::Dynamic, &k, &snap).unwrap());
    assert!(!tiers.put(TierKind::Dynamic, &k, &snap).unwrap());

    let updated = Snapshot::new(200, Vec::new(), vec![4]);
    assert!(tiers.put(TierKind::Dynamic, &k, &updated).unwrap());
    assert_eq!(tiers.get(TierKind::Dynamic, &k).unwrap().unwrap().body, vec![4]);
    assert!(tiers.get(TierKind::Static, &k).unwrap().is_none());
  }

  #[test]
  fn test_evict_stale_keeps_current_generation() {
    let storage = storage();
    let old = TierStore::new(Arc::clone(&storage), "v1");
    old.open_current().unwrap();
    storage.open_tier("leaflet-tiles").unwrap();

    let current = TierStore::new(Arc::clone(&storage), "v2");
    current.open_current().unwrap();

    let mut evicted = current.evict_stale().unwrap();
    evicted.sort();
    assert_eq!(evicted, vec!["dynamic-v1", "leaflet-tiles", "static-v1"]);
    assert_eq!(storage.tier_names().unwrap(), vec!["dynamic-v2", "static-v2"]);
  }
}
