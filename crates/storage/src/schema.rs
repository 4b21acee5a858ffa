use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS records (
    record_id BLOB PRIMARY KEY CHECK (length(record_id) = 16),
    model TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_records_model ON records (model);

CREATE TABLE IF NOT EXISTS fields (
    record_id BLOB NOT NULL REFERENCES records (record_id),
    field_key TEXT NOT NULL,
    value BLOB NOT NULL,
    PRIMARY KEY (record_id, field_key)
);

CREATE TABLE IF NOT EXISTS refs (
    record_id BLOB NOT NULL REFERENCES records (record_id),
    field_key TEXT NOT NULL,
    target_id BLOB NOT NULL REFERENCES records (record_id),
    PRIMARY KEY (record_id, field_key)
);
CREATE INDEX IF NOT EXISTS idx_refs_target ON refs (target_id, field_key);

CREATE TABLE IF NOT EXISTS links (
    model TEXT NOT NULL,
    field_key TEXT NOT NULL,
    source_id BLOB NOT NULL REFERENCES records (record_id),
    target_id BLOB NOT NULL REFERENCES records (record_id),
    PRIMARY KEY (model, field_key, source_id, target_id)
);
CREATE INDEX IF NOT EXISTS idx_links_target ON links (model, field_key, target_id);
";
