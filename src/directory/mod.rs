//! Durable address directory.
//!
//! The store owns the authoritative copy of every record. [`Directory`]
//! layers the read cache and the spreadsheet mirror on top so a single
//! user submission updates all three.

pub mod schema;
pub mod service;
pub mod sqlite;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;

pub use service::{Directory, WriteReport};
pub use sqlite::SqliteDirectory;
pub use types::{AddressRecord, FieldUpdate};

/// Relational record store.
///
/// Lookups never report absence as an error: a missing handle yields a
/// zero-value record and a search with no hits yields an empty vector.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Live record for `handle` (normalized first), or an empty record.
    async fn get_by_handle(&self, handle: &str) -> Result<AddressRecord>;

    /// Insert or replace the live record keyed by its normalized handle.
    async fn upsert(&self, record: &AddressRecord) -> Result<()>;

    /// Upsert every record in one transaction. Returns the number written.
    async fn upsert_many(&self, records: &[AddressRecord]) -> Result<usize>;

    /// Match by phone, secondary handle, handle or email; falls back to
    /// name matching when no identifier matches.
    async fn search(&self, query: &str) -> Result<Vec<AddressRecord>>;

    /// Every live record, ordered by handle.
    async fn list_live(&self) -> Result<Vec<AddressRecord>>;
}
