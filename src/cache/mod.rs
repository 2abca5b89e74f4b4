//! Two-tier persistent response cache.
//!
//! This module provides:
//! - A storage capability trait (`get`/`put`/`delete`/`keys` per named tier)
//! - A SQLite backend for it
//! - `TierStore`, binding the static and dynamic tiers of one worker version
//! - Version-based eviction of superseded tiers (no per-entry expiry)

mod storage;
mod tier;
mod traits;

pub use storage::SqliteStorage;
pub use tier::TierStore;
pub use traits::{CacheStorage, RequestKey, Snapshot, TierKind, TierNames};
