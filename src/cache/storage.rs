//! SQLite implementation of the tier storage.

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;

use super::traits::{CacheStorage, RequestKey, Snapshot};
use crate::db::{format_timestamp, parse_timestamp, Database};
use crate::error::StoreError;

/// SQLite-based cache storage implementation.
#[derive(Clone)]
pub struct SqliteStorage {
  db: Arc<Database>,
}

impl SqliteStorage {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }

  /// Number of entries per tier, for diagnostics.
  pub fn entry_counts(&self) -> Result<Vec<(String, usize)>, StoreError> {
    let conn = self.db.conn()?;
    let mut stmt = conn.prepare(
      "SELECT t.name, COUNT(e.request_key) FROM cache_tiers t
       LEFT JOIN cache_entries e ON e.tier = t.name
       GROUP BY t.name ORDER BY t.name",
    )?;
    let counts = stmt
      .query_map([], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? as usize)))?
      .collect::<Result<Vec<_>, _>>()?;
    Ok(counts)
  }
}

fn ensure_tier(conn: &Connection, tier: &str) -> Result<(), StoreError> {
  conn.execute(
    "INSERT OR IGNORE INTO cache_tiers (name) VALUES (?)",
    params![tier],
  )?;
  Ok(())
}

/// Upsert one entry. An overwrite keeps the entry's original position.
fn upsert_entry(
  conn: &Connection,
  tier: &str,
  key: &RequestKey,
  snapshot: &Snapshot,
) -> Result<(), StoreError> {
  let headers = serde_json::to_vec(&snapshot.headers)?;
  conn.execute(
    "INSERT INTO cache_entries (tier, request_key, position, status, headers, body, digest, captured_at)
     VALUES (?1, ?2,
             (SELECT COALESCE(MAX(position), 0) + 1 FROM cache_entries WHERE tier = ?1),
             ?3, ?4, ?5, ?6, ?7)
     ON CONFLICT (tier, request_key) DO UPDATE SET
       status = excluded.status,
       headers = excluded.headers,
       body = excluded.body,
       digest = excluded.digest,
       captured_at = excluded.captured_at",
    params![
      tier,
      key.as_str(),
      snapshot.status,
      headers,
      snapshot.body,
      snapshot.digest(),
      format_timestamp(&snapshot.captured_at),
    ],
  )?;
  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn open_tier(&self, tier: &str) -> Result<(), StoreError> {
    let conn = self.db.conn()?;
    ensure_tier(&conn, tier)
  }

  fn tier_names(&self) -> Result<Vec<String>, StoreError> {
    let conn = self.db.conn()?;
    let mut stmt = conn.prepare("SELECT name FROM cache_tiers ORDER BY name")?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
  }

  fn delete_tier(&self, tier: &str) -> Result<bool, StoreError> {
    let mut conn = self.db.conn()?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM cache_entries WHERE tier = ?", params![tier])?;
    let removed = tx.execute("DELETE FROM cache_tiers WHERE name = ?", params![tier])?;
    tx.commit()?;
    Ok(removed > 0)
  }

  fn get(&self, tier: &str, key: &RequestKey) -> Result<Option<Snapshot>, StoreError> {
    let conn = self.db.conn()?;
    let row: Option<(u16, Vec<u8>, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, headers, body, captured_at FROM cache_entries
         WHERE tier = ? AND request_key = ?",
        params![tier, key.as_str()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()?;

    match row {
      Some((status, headers, body, captured_at)) => Ok(Some(Snapshot {
        status,
        headers: serde_json::from_slice(&headers)?,
        body,
        captured_at: parse_timestamp(&captured_at)?,
      })),
      None => Ok(None),
    }
  }

  fn put(&self, tier: &str, key: &RequestKey, snapshot: &Snapshot) -> Result<(), StoreError> {
    let mut conn = self.db.conn()?;
    let tx = conn.transaction()?;
    ensure_tier(&tx, tier)?;
    upsert_entry(&tx, tier, key, snapshot)?;
    tx.commit()?;
    Ok(())
  }

  fn put_all(&self, tier: &str, entries: &[(RequestKey, Snapshot)]) -> Result<(), StoreError> {
    let mut conn = self.db.conn()?;
    let tx = conn.transaction()?;
    ensure_tier(&tx, tier)?;
    for (key, snapshot) in entries {
      upsert_entry(&tx, tier, key, snapshot)?;
    }
    // Dropping the transaction on an early return rolls everything back
    tx.commit()?;
    Ok(())
  }

  fn delete(&self, tier: &str, key: &RequestKey) -> Result<bool, StoreError> {
    let conn = self.db.conn()?;
    let removed = conn.execute(
      "DELETE FROM cache_entries WHERE tier = ? AND request_key = ?",
      params![tier, key.as_str()],
    )?;
    Ok(removed > 0)
  }

  fn keys(&self, tier: &str) -> Result<Vec<RequestKey>, StoreError> {
    let conn = self.db.conn()?;
    let mut stmt =
      conn.prepare("SELECT request_key FROM cache_entries WHERE tier = ? ORDER BY position")?;
    let keys = stmt
      .query_map(params![tier], |row| row.get(0))?
      .map(|r| r.map(RequestKey::from_stored))
      .collect::<Result<Vec<_>, _>>()?;
    Ok(keys)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::request::Request;
  use url::Url;

  fn storage() -> SqliteStorage {
    SqliteStorage::new(Arc::new(Database::open_in_memory().unwrap()))
  }

  fn key(url: &str) -> RequestKey {
    RequestKey::for_request(&Request::get(Url::parse(url).unwrap())).unwrap()
  }

  fn snapshot(body: &str) -> Snapshot {
    Snapshot::new(
      200,
      vec![("Content-Type".to_string(), "text/plain".to_string())],
      body,
    )
  }

  #[test]
  fn test_put_then_get() {
    let storage = storage();
    let k = key("http://localhost/main.js");
    let snap = snapshot("console.log(1)");

    storage.put("static-v1", &k, &snap).unwrap();

    let stored = storage.get("static-v1", &k).unwrap().unwrap();
    assert_eq!(stored, snap);
    assert!(storage.get("dynamic-v1", &k).unwrap().is_none());
  }

  #[test]
  fn test_overwrite_with_same_snapshot_is_idempotent() {
    let storage = storage();
    let k = key("http://localhost/");
    let snap = snapshot("<html>");

    storage.put("static-v1", &k, &snap).unwrap();
    storage.put("static-v1", &k, &snap).unwrap();

    assert_eq!(storage.keys("static-v1").unwrap(), vec![k.clone()]);
    assert_eq!(storage.get("static-v1", &k).unwrap().unwrap(), snap);
  }

  #[test]
  fn test_keys_keep_insertion_order_across_overwrites() {
    let storage = storage();
    let a = key("http://localhost/a.css");
    let b = key("http://localhost/b.css");
    let c = key("http://localhost/c.css");

    storage.put("static-v1", &a, &snapshot("a")).unwrap();
    storage.put("static-v1", &b, &snapshot("b")).unwrap();
    storage.put("static-v1", &c, &snapshot("c")).unwrap();
    storage.put("static-v1", &a, &snapshot("a2")).unwrap();

    assert_eq!(storage.keys("static-v1").unwrap(), vec![a, b, c]);
  }

  #[test]
  fn test_delete_tier_removes_entries() {
    let storage = storage();
    let k = key("http://localhost/");
    storage.put("static-v1", &k, &snapshot("old")).unwrap();
    storage.open_tier("static-v2").unwrap();

    assert!(storage.delete_tier("static-v1").unwrap());
    assert!(!storage.delete_tier("static-v1").unwrap());

    assert_eq!(storage.tier_names().unwrap(), vec!["static-v2".to_string()]);
    assert!(storage.get("static-v1", &k).unwrap().is_none());
  }

  #[test]
  fn test_delete_single_entry() {
    let storage = storage();
    let k = key("http://localhost/api/v1/places");
    storage.put("dynamic-v1", &k, &snapshot("[]")).unwrap();

    assert!(storage.delete("dynamic-v1", &k).unwrap());
    assert!(!storage.delete("dynamic-v1", &k).unwrap());
    assert!(storage.keys("dynamic-v1").unwrap().is_empty());
    // The tier itself survives
    assert_eq!(storage.tier_names().unwrap(), vec!["dynamic-v1".to_string()]);
  }

  #[test]
  fn test_put_all_commits_batch() {
    let storage = storage();
    let entries = vec![
      (key("http://localhost/"), snapshot("<html>")),
      (key("http://localhost/main.js"), snapshot("js")),
    ];

    storage.put_all("static-v1", &entries).unwrap();

    assert_eq!(storage.keys("static-v1").unwrap().len(), 2);
    assert_eq!(
      storage.entry_counts().unwrap(),
      vec![("static-v1".to_string(), 2)]
    );
  }
}
