//! SQLite DDL for the address directory.

use rusqlite::Connection;

/// Complete DDL for the directory database.
///
/// Uses `IF NOT EXISTS` throughout so `apply_schema` is idempotent.
pub(crate) const SCHEMA_SQL: &str = r#"
-- Enable WAL mode for concurrent reads during writes.
PRAGMA journal_mode = WAL;

-- Schema version tracking.
CREATE TABLE IF NOT EXISTS schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- One row per member; soft-deleted rows keep their data.
CREATE TABLE IF NOT EXISTS addresses (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    handle           TEXT NOT NULL,               -- normalized
    secondary_handle TEXT NOT NULL DEFAULT '',    -- normalized
    name             TEXT NOT NULL DEFAULT '',
    address          TEXT NOT NULL DEFAULT '',
    wishes           TEXT NOT NULL DEFAULT '',
    approved         INTEGER NOT NULL DEFAULT 0,
    phone            TEXT NOT NULL DEFAULT '',
    email            TEXT NOT NULL DEFAULT '',
    created_at       INTEGER NOT NULL DEFAULT 0,
    updated_at       INTEGER NOT NULL DEFAULT 0,
    deleted_at       INTEGER                      -- NULL while live
);

-- At most one live row per handle.
CREATE UNIQUE INDEX IF NOT EXISTS idx_addresses_handle_live
    ON addresses(handle) WHERE deleted_at IS NULL;

CREATE INDEX IF NOT EXISTS idx_addresses_secondary ON addresses(secondary_handle);
CREATE INDEX IF NOT EXISTS idx_addresses_phone     ON addresses(phone);
"#;

/// Apply the full schema to an open connection.
///
/// Seeds the schema version into `schema_meta` on a fresh database.
pub(crate) fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    let version_str = super::types::CURRENT_SCHEMA_VERSION.to_string();
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        rusqlite::params![version_str],
    )?;

    Ok(())
}

/// Read the current schema version, `None` when unset.
pub(crate) fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    let mut stmt = conn.prepare("SELECT value FROM schema_meta WHERE key = 'schema_version'")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().ok())
        }
        None => Ok(None),
    }
}
