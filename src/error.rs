use thiserror::Error;

use crate::lifecycle::WorkerState;

/// Failures of the persistent stores (cache tiers and the action queue).
#[derive(Error, Debug)]
pub enum StoreError {
  #[error("SQLite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("Failed to (de)serialize stored value: {0}")]
  Serde(#[from] serde_json::Error),

  #[error("Failed to create database directory: {0}")]
  Io(#[from] std::io::Error),

  #[error("Invalid timestamp '{0}' in store")]
  Timestamp(String),

  #[error("Store lock poisoned")]
  Poisoned,
}

/// A network fetch that did not produce a usable response.
#[derive(Error, Debug)]
pub enum FetchError {
  #[error("Network error: {0}")]
  Network(#[from] reqwest::Error),

  #[error("{0} is unreachable")]
  Unreachable(String),

  #[error("Unexpected status {status} for {url}")]
  Status { status: u16, url: String },

  #[error("Invalid request: {0}")]
  InvalidRequest(String),
}

/// Errors surfaced by worker event handlers.
#[derive(Error, Debug)]
pub enum WorkerError {
  #[error("Install failed fetching {url}: {source}")]
  Install {
    url: String,
    #[source]
    source: FetchError,
  },

  #[error(transparent)]
  Fetch(#[from] FetchError),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("Cannot move worker from {from:?} to {to:?}")]
  InvalidTransition { from: WorkerState, to: WorkerState },
}

impl WorkerError {
  /// Whether this error is a network failure surfaced to the page.
  pub fn is_fetch_failure(&self) -> bool {
    matches!(self, WorkerError::Fetch(_))
  }
}
