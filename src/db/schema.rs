/// Schema for the worker's database.
pub const SCHEMA: &str = r#"
-- Named cache partitions; a tier may exist without entries
CREATE TABLE IF NOT EXISTS cache_tiers (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Stored response snapshots, ordered by insertion within a tier
CREATE TABLE IF NOT EXISTS cache_entries (
    tier TEXT NOT NULL,
    request_key TEXT NOT NULL,
    position INTEGER NOT NULL,
    status INTEGER NOT NULL,
    headers BLOB NOT NULL,
    body BLOB NOT NULL,
    digest TEXT NOT NULL,
    captured_at TEXT NOT NULL,
    PRIMARY KEY (tier, request_key)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_position
    ON cache_entries(tier, position);

-- Actions attempted while offline, replayed in id order
CREATE TABLE IF NOT EXISTS offline_actions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    headers BLOB NOT NULL,
    body BLOB,
    enqueued_at TEXT NOT NULL
);
"#;
