//! Durable queue of actions attempted while offline, replayed on reconnect.

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;
use std::sync::Arc;
use url::Url;

use crate::db::{format_timestamp, parse_timestamp, Database};
use crate::error::{FetchError, StoreError};
use crate::network::Fetcher;
use crate::request::Request;

/// A mutation waiting to be replayed against the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfflineAction {
  pub id: i64,
  pub method: String,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
  pub enqueued_at: DateTime<Utc>,
}

impl OfflineAction {
  fn to_request(&self) -> Request {
    Request {
      method: self.method.clone(),
      url: self.url.clone(),
      destination: Default::default(),
      headers: self.headers.clone(),
      body: self.body.clone(),
    }
  }
}

/// Persistence for queued actions.
pub trait ActionStore: Send + Sync {
  /// Append an action built from `request`, returning it with its id.
  fn push(&self, request: &Request) -> Result<OfflineAction, StoreError>;

  /// All queued actions, oldest first.
  fn pending(&self) -> Result<Vec<OfflineAction>, StoreError>;

  /// Remove an action. Returns whether it was queued.
  fn remove(&self, id: i64) -> Result<bool, StoreError>;

  fn len(&self) -> Result<usize, StoreError>;
}

/// SQLite-backed action queue.
#[derive(Clone)]
pub struct SqliteActionStore {
  db: Arc<Database>,
}

impl SqliteActionStore {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

impl ActionStore for SqliteActionStore {
  fn push(&self, request: &Request) -> Result<OfflineAction, StoreError> {
    let conn = self.db.conn()?;
    let enqueued_at = Utc::now();
    conn.execute(
      "INSERT INTO offline_actions (method, url, headers, body, enqueued_at)
       VALUES (?, ?, ?, ?, ?)",
      params![
        request.method,
        request.url.as_str(),
        serde_json::to_vec(&request.headers)?,
        request.body,
        format_timestamp(&enqueued_at),
      ],
    )?;

    Ok(OfflineAction {
      id: conn.last_insert_rowid(),
      method: request.method.clone(),
      url: request.url.clone(),
      headers: request.headers.clone(),
      body: request.body.clone(),
      enqueued_at,
    })
  }

  /// Rows that can never be replayed are logged and deleted, not returned.
  fn pending(&self) -> Result<Vec<OfflineAction>, StoreError> {
    let conn = self.db.conn()?;
    let mut stmt = conn.prepare(
      "SELECT id, method, url, headers, body, enqueued_at FROM offline_actions ORDER BY id",
    )?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, i64>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
          row.get::<_, Vec<u8>>(3)?,
          row.get::<_, Option<Vec<u8>>>(4)?,
          row.get::<_, String>(5)?,
        ))
      })?
      .collect::<Result<Vec<_>, _>>()?;
    drop(stmt);

    let mut actions = Vec::with_capacity(rows.len());
    let mut broken = Vec::new();
    for (id, method, url, headers, body, enqueued_at) in rows {
      match decode_action(id, method, &url, &headers, body, &enqueued_at) {
        Ok(action) => actions.push(action),
        Err(reason) => {
          tracing::warn!(id, %reason, "Dropping queued action that can't be replayed");
          broken.push(id);
        }
      }
    }
    for id in broken {
      conn.execute("DELETE FROM offline_actions WHERE id = ?", params![id])?;
    }
    Ok(actions)
  }

  fn remove(&self, id: i64) -> Result<bool, StoreError> {
    let conn = self.db.conn()?;
    let removed = conn.execute("DELETE FROM offline_actions WHERE id = ?", params![id])?;
    Ok(removed > 0)
  }

  fn len(&self) -> Result<usize, StoreError> {
    let conn = self.db.conn()?;
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM offline_actions", [], |row| row.get(0))?;
    Ok(count as usize)
  }
}

/// Rebuild a stored row, or say why it can never be replayed.
fn decode_action(
  id: i64,
  method: String,
  url: &str,
  headers: &[u8],
  body: Option<Vec<u8>>,
  enqueued_at: &str,
) -> Result<OfflineAction, String> {
  let url = Url::parse(url).map_err(|e| format!("invalid URL '{}': {}", url, e))?;
  let headers = serde_json::from_slice(headers).map_err(|e| format!("invalid headers: {}", e))?;
  let enqueued_at = parse_timestamp(enqueued_at).map_err(|e| e.to_string())?;
  Ok(OfflineAction {
    id,
    method,
    url,
    headers,
    body,
    enqueued_at,
  })
}

/// One action that failed to replay during a drain pass.
#[derive(Debug)]
pub struct SyncItemFailure {
  pub id: i64,
  pub error: FetchError,
}

/// Outcome of one drain pass.
#[derive(Debug, Default)]
pub struct SyncReport {
  /// Ids of replayed and removed actions
  pub replayed: Vec<i64>,
  /// Actions left queued for the next trigger
  pub failed: Vec<SyncItemFailure>,
}

impl SyncReport {
  pub fn is_clean(&self) -> bool {
    self.failed.is_empty()
  }
}

/// Queue of offline actions with at-least-once replay.
pub struct SyncQueue<A: ActionStore, F: Fetcher> {
  store: A,
  fetcher: Arc<F>,
}

impl<A: ActionStore, F: Fetcher> SyncQueue<A, F> {
  pub fn new(store: A, fetcher: Arc<F>) -> Self {
    Self { store, fetcher }
  }

  pub fn enqueue(&self, request: &Request) -> Result<OfflineAction, StoreError> {
    let action = self.store.push(request)?;
    tracing::info!(id = action.id, method = %action.method, url = %action.url, "Queued offline action");
    Ok(action)
  }

  /// Drop a queued action without replaying it.
  pub fn cancel(&self, id: i64) -> Result<bool, StoreError> {
    let removed = self.store.remove(id)?;
    if removed {
      tracing::info!(id, "Cancelled offline action");
    }
    Ok(removed)
  }

  pub fn pending(&self) -> Result<Vec<OfflineAction>, StoreError> {
    self.store.pending()
  }

  pub fn len(&self) -> Result<usize, StoreError> {
    self.store.len()
  }

  /// Replay every queued action once, oldest first.
  ///
  /// Successful (2xx) actions are removed. Failures stay queued for the next
  /// trigger and don't stop the pass.
  pub async fn drain(&self) -> Result<SyncReport, StoreError> {
    let actions = self.store.pending()?;
    let mut report = SyncReport::default();
    tracing::info!(count = actions.len(), "Replaying offline actions");

    for action in actions {
      let outcome = match self.fetcher.fetch(&action.to_request()).await {
        Ok(response) if response.is_success() => Ok(()),
        Ok(response) => Err(FetchError::Status {
          status: response.status,
          url: action.url.to_string(),
        }),
        Err(e) => Err(e),
      };

      match outcome {
        Ok(()) => match self.store.remove(action.id) {
          Ok(_) => report.replayed.push(action.id),
          Err(e) => {
            // Replayed but still queued: it will be sent again next pass
            tracing::warn!(id = action.id, error = %e, "Failed to dequeue replayed action");
          }
        },
        Err(error) => {
          tracing::warn!(id = action.id, error = %error, "Offline action failed, keeping it queued");
          report.failed.push(SyncItemFailure {
            id: action.id,
            error,
          });
        }
      }
    }

    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::MockFetcher;

  fn queue() -> (SyncQueue<SqliteActionStore, MockFetcher>, Arc<MockFetcher>) {
    let store = SqliteActionStore::new(Arc::new(Database::open_in_memory().unwrap()));
    let fetcher = MockFetcher::new();
    (SyncQueue::new(store, fetcher.clone()), fetcher)
  }

  fn post(url: &str, body: &str) -> Request {
    Request::new("POST", Url::parse(url).unwrap())
      .with_header("Content-Type", "application/json")
      .with_body(body)
  }

  #[tokio::test]
  async fn test_drain_empties_queue_when_online() {
    let (queue, fetcher) = queue();
    fetcher.respond("http://localhost:3000/api/v1/favorites", 201, "");
    let action = queue
      .enqueue(&post("http://localhost:3000/api/v1/favorites", r#"{"place":42}"#))
      .unwrap();

    let report = queue.drain().await.unwrap();

    assert_eq!(report.replayed, vec![action.id]);
    assert!(report.is_clean());
    assert!(queue.pending().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_failed_action_is_isolated_and_retried() {
    let (queue, fetcher) = queue();
    let urls = [
      "http://localhost:3000/api/v1/a",
      "http://localhost:3000/api/v1/b",
      "http://localhost:3000/api/v1/c",
    ];
    for url in urls {
      fetcher.respond(url, 200, "ok");
    }
    fetcher.fail(urls[1]);
    let ids: Vec<i64> = urls
      .iter()
      .map(|u| queue.enqueue(&post(u, "{}")).unwrap().id)
      .collect();

    let report = queue.drain().await.unwrap();

    assert_eq!(report.replayed, vec![ids[0], ids[2]]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].id, ids[1]);
    let remaining: Vec<i64> = queue.pending().unwrap().iter().map(|a| a.id).collect();
    assert_eq!(remaining, vec![ids[1]]);

    // Next trigger attempts it again
    queue.drain().await.unwrap();
    assert_eq!(fetcher.calls_to(urls[1]), 2);
  }

  #[tokio::test]
  async fn test_drain_replays_in_enqueue_order() {
    let (queue, fetcher) = queue();
    for path in ["first", "second", "third"] {
      let url = format!("http://localhost:3000/api/v1/{}", path);
      fetcher.respond(&url, 204, "");
      queue.enqueue(&post(&url, "{}")).unwrap();
    }

    queue.drain().await.unwrap();

    let order: Vec<String> = fetcher.calls().into_iter().map(|(_, url)| url).collect();
    assert_eq!(
      order,
      vec![
        "http://localhost:3000/api/v1/first",
        "http://localhost:3000/api/v1/second",
        "http://localhost:3000/api/v1/third",
      ]
    );
  }

  #[tokio::test]
  async fn test_non_success_status_keeps_action() {
    let (queue, _) = queue();
    queue
      .enqueue(&post("http://localhost:3000/api/v1/unknown", "{}"))
      .unwrap();

    let report = queue.drain().await.unwrap();

    assert!(matches!(
      report.failed[0].error,
      FetchError::Status { status: 404, .. }
    ));
    assert_eq!(queue.pending().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_replay_preserves_method_headers_and_body() {
    let (queue, _) = queue();
    let request = post("http://localhost:3000/api/v1/share", r#"{"lat":1.5}"#);
    queue.enqueue(&request).unwrap();

    let stored = queue.pending().unwrap().remove(0);
    assert_eq!(stored.to_request(), request);
  }

  #[test]
  fn test_cancel() {
    let (queue, _) = queue();
    let action = queue
      .enqueue(&post("http://localhost:3000/api/v1/share", "{}"))
      .unwrap();

    assert_eq!(queue.len().unwrap(), 1);
    assert!(queue.cancel(action.id).unwrap());
    assert!(!queue.cancel(action.id).unwrap());
    assert_eq!(queue.len().unwrap(), 0);
  }

  #[tokio::test]
  async fn test_unreadable_rows_are_dropped_without_blocking_the_pass() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let fetcher = MockFetcher::new();
    let queue = SyncQueue::new(SqliteActionStore::new(Arc::clone(&db)), fetcher.clone());
    let url = "http://localhost:3000/api/v1/favorites";
    fetcher.respond(url, 201, "");

    {
      let conn = db.conn().unwrap();
      conn
        .execute(
          "INSERT INTO offline_actions (method, url, headers, body, enqueued_at)
           VALUES ('POST', ?, X'5B5D', NULL, 'yesterday')",
          params![url],
        )
        .unwrap();
      conn
        .execute(
          "INSERT INTO offline_actions (method, url, headers, body, enqueued_at)
           VALUES ('POST', 'not a url', X'5B5D', NULL, '2026-01-01T00:00:00Z')",
          [],
        )
        .unwrap();
    }
    let good = queue.enqueue(&post(url, "{}")).unwrap();

    let report = queue.drain().await.unwrap();

    assert_eq!(report.replayed, vec![good.id]);
    assert!(report.is_clean());
    assert_eq!(queue.len().unwrap(), 0);
  }
}
