//! Offline resource manager for the map app.
//!
//! Intercepted requests are classified and answered cache-first (app shell,
//! assets, tiles) or network-first (API and everything else) from a two-tier
//! persistent cache. Mutations made while offline are queued and replayed when
//! connectivity returns.

pub mod background;
pub mod cache;
pub mod classify;
pub mod config;
pub mod control;
pub mod db;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod network;
pub mod request;
pub mod strategy;
pub mod sync;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{FetchError, StoreError, WorkerError};
pub use worker::{EventOutcome, ServiceWorker, WorkerEvent};
