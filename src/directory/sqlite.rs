//! SQLite-backed directory store.
//!
//! Single database file; a partial unique index keeps at most one live row
//! per normalized handle. Async callers go through `spawn_blocking` so the
//! runtime threads never wait on disk.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{Connection, params};
use tracing::debug;

use super::DirectoryStore;
use super::schema::{apply_schema, read_schema_version};
use super::types::{AddressRecord, now_epoch_secs};
use crate::error::{BotError, Result};
use crate::normalize::{
    collapse_whitespace, normalize_handle, normalize_phone, normalize_secondary_handle,
};

/// Minimum token length (in chars) for a name-token match.
const MIN_NAME_TOKEN_CHARS: usize = 2;

const SELECT_COLUMNS: &str = "SELECT handle, secondary_handle, name, address, wishes, approved, \
     phone, email FROM addresses";

const UPSERT_SQL: &str = "INSERT INTO addresses \
     (handle, secondary_handle, name, address, wishes, approved, phone, email, created_at, updated_at) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9) \
     ON CONFLICT(handle) WHERE deleted_at IS NULL DO UPDATE SET \
     secondary_handle = excluded.secondary_handle, \
     name = excluded.name, \
     address = excluded.address, \
     wishes = excluded.wishes, \
     approved = excluded.approved, \
     phone = excluded.phone, \
     email = excluded.email, \
     updated_at = excluded.updated_at";

/// SQLite directory store.
///
/// Thread-safe via a shared `Mutex<Connection>`; all statements are
/// serialized.
#[derive(Clone)]
pub struct SqliteDirectory {
    path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDirectory {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        apply_schema(&conn)?;
        debug!(path = %path.display(), "directory database opened");
        Ok(Self {
            path: Some(path.to_path_buf()),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            path: None,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the schema version stamp.
    pub fn schema_version(&self) -> Result<Option<u32>> {
        let conn = self.lock()?;
        Ok(read_schema_version(&conn)?)
    }

    /// Mark the live record for `handle` as deleted. Returns whether one existed.
    pub fn soft_delete(&self, handle: &str) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE addresses SET deleted_at = ?1, updated_at = ?1 \
             WHERE handle = ?2 AND deleted_at IS NULL",
            params![now_epoch_secs(), normalize_handle(handle)],
        )?;
        Ok(changed > 0)
    }

    /// Set the moderation flag on the live record for `handle`.
    pub fn set_approved(&self, handle: &str, approved: bool) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE addresses SET approved = ?1, updated_at = ?2 \
             WHERE handle = ?3 AND deleted_at IS NULL",
            params![approved, now_epoch_secs(), normalize_handle(handle)],
        )?;
        Ok(changed > 0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| BotError::Lock(e.to_string()))
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|e| BotError::Lock(e.to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| BotError::Task(e.to_string()))?
    }
}

#[async_trait]
impl DirectoryStore for SqliteDirectory {
    async fn get_by_handle(&self, handle: &str) -> Result<AddressRecord> {
        let handle = normalize_handle(handle);
        self.blocking(move |conn| query_by_handle(conn, &handle))
            .await
    }

    async fn upsert(&self, record: &AddressRecord) -> Result<()> {
        let record = record.clone();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare_cached(UPSERT_SQL)?;
            execute_upsert(&mut stmt, &record, now_epoch_secs())
        })
        .await
    }

    async fn upsert_many(&self, records: &[AddressRecord]) -> Result<usize> {
        let records = records.to_vec();
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let now = now_epoch_secs();
            {
                let mut stmt = tx.prepare_cached(UPSERT_SQL)?;
                for record in &records {
                    execute_upsert(&mut stmt, record, now)?;
                }
            }
            tx.commit()?;
            Ok(records.len())
        })
        .await
    }

    async fn search(&self, query: &str) -> Result<Vec<AddressRecord>> {
        let query = query.trim().to_owned();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.blocking(move |conn| query_search(conn, &query)).await
    }

    async fn list_live(&self) -> Result<Vec<AddressRecord>> {
        self.blocking(|conn| {
            let sql = format!("{SELECT_COLUMNS} WHERE deleted_at IS NULL ORDER BY handle");
            let mut stmt = conn.prepare(&sql)?;
            collect_rows(&mut stmt, params![])
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// Query helpers
// ---------------------------------------------------------------------------

fn query_by_handle(conn: &Connection, handle: &str) -> Result<AddressRecord> {
    let sql = format!("{SELECT_COLUMNS} WHERE handle = ?1 AND deleted_at IS NULL");
    let mut stmt = conn.prepare(&sql)?;
    let mut found = collect_rows(&mut stmt, params![handle])?;
    match found.len() {
        0 => Ok(AddressRecord::new(handle)),
        1 => Ok(found.remove(0)),
        count => Err(BotError::Integrity {
            handle: handle.to_owned(),
            count,
        }),
    }
}

fn query_search(conn: &Connection, query: &str) -> Result<Vec<AddressRecord>> {
    let phone = normalize_phone(query);
    let secondary = normalize_secondary_handle(query);
    let handle = normalize_handle(query);
    let lowered = collapse_whitespace(&query.to_lowercase());

    let sql = format!(
        "{SELECT_COLUMNS} WHERE deleted_at IS NULL AND ( \
         (?1 <> '' AND phone = ?1) \
         OR (?2 <> '' AND secondary_handle = ?2) \
         OR (?3 <> '' AND handle = ?3) \
         OR (email <> '' AND lower(email) = ?4)) \
         ORDER BY handle"
    );
    let mut stmt = conn.prepare(&sql)?;
    let hits = collect_rows(&mut stmt, params![phone, secondary, handle, lowered])?;
    if !hits.is_empty() {
        return Ok(hits);
    }

    let sql = format!("{SELECT_COLUMNS} WHERE deleted_at IS NULL AND name <> '' ORDER BY handle");
    let mut stmt = conn.prepare(&sql)?;
    let named = collect_rows(&mut stmt, params![])?;
    Ok(named
        .into_iter()
        .filter(|record| name_matches(&record.name, &lowered))
        .collect())
}

/// Whole-name or whole-token match, case-insensitive and blind to
/// whitespace runs.
fn name_matches(name: &str, lowered_query: &str) -> bool {
    let name = collapse_whitespace(&name.to_lowercase());
    if name == lowered_query {
        return true;
    }
    lowered_query.chars().count() >= MIN_NAME_TOKEN_CHARS
        && name.split_whitespace().any(|token| token == lowered_query)
}

fn execute_upsert(
    stmt: &mut rusqlite::CachedStatement<'_>,
    record: &AddressRecord,
    now: u64,
) -> Result<()> {
    let handle = normalize_handle(&record.handle);
    if handle.is_empty() {
        return Err(BotError::InvalidRecord(format!(
            "handle `{}` is empty after normalization",
            record.handle
        )));
    }
    stmt.execute(params![
        handle,
        normalize_secondary_handle(&record.secondary_handle),
        record.name,
        record.address,
        record.wishes,
        record.approved,
        normalize_phone(&record.phone),
        record.email,
        now,
    ])?;
    Ok(())
}

fn collect_rows(
    stmt: &mut rusqlite::Statement<'_>,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<AddressRecord>> {
    let rows = stmt.query_map(params, row_to_record)?;
    let mut records = Vec::new();
    for r in rows {
        records.push(r?);
    }
    Ok(records)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<AddressRecord> {
    Ok(AddressRecord {
        handle: row.get(0)?,
        secondary_handle: row.get(1)?,
        name: row.get(2)?,
        address: row.get(3)?,
        wishes: row.get(4)?,
        approved: row.get(5)?,
        phone: row.get(6)?,
        email: row.get(7)?,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
