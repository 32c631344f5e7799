//! Dual-write façade over the store, the read cache and the sheet mirror.
//!
//! The store is authoritative. Cache and mirror are refreshed after a
//! successful store write; a mirror failure is reported, never rolled back.
//! The next sync cycle reconciles the two copies.

use std::sync::Arc;

use tracing::{debug, warn};

use super::DirectoryStore;
use super::types::{AddressRecord, FieldUpdate};
use crate::cache::DirectoryCache;
use crate::error::Result;
use crate::sheets::SheetMirror;

/// Outcome of a user submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    /// The record as stored.
    pub record: AddressRecord,
    /// False when the store write succeeded but the sheet push did not.
    pub mirrored: bool,
}

/// Directory service shared by conversation handlers.
#[derive(Clone)]
pub struct Directory {
    store: Arc<dyn DirectoryStore>,
    mirror: Arc<dyn SheetMirror>,
    cache: Arc<DirectoryCache>,
}

impl Directory {
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        mirror: Arc<dyn SheetMirror>,
        cache: Arc<DirectoryCache>,
    ) -> Self {
        Self {
            store,
            mirror,
            cache,
        }
    }

    pub fn store(&self) -> &Arc<dyn DirectoryStore> {
        &self.store
    }

    pub fn mirror(&self) -> &Arc<dyn SheetMirror> {
        &self.mirror
    }

    pub fn cache(&self) -> &Arc<DirectoryCache> {
        &self.cache
    }

    /// Current record for `handle`, empty when unknown.
    pub async fn record_for(&self, handle: &str) -> Result<AddressRecord> {
        self.store.get_by_handle(handle).await
    }

    /// Apply one field change for `handle` and propagate it.
    pub async fn submit(&self, handle: &str, update: FieldUpdate) -> Result<WriteReport> {
        let mut record = self.store.get_by_handle(handle).await?;
        update.apply(&mut record);
        self.store.upsert(&record).await?;
        self.cache.upsert_one(record.clone())?;
        debug!(handle = %record.handle, field = update.field(), "record stored");

        let mirrored = match self.mirror.push(&record).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    handle = %record.handle,
                    mirror = self.mirror.id(),
                    error = %err,
                    "sheet push failed; store write kept"
                );
                false
            }
        };
        Ok(WriteReport { record, mirrored })
    }

    pub async fn search(&self, query: &str) -> Result<Vec<AddressRecord>> {
        self.store.search(query).await
    }

    /// Random record from the cache.
    pub fn pick_random(&self) -> Result<AddressRecord> {
        self.cache.pick_random()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::directory::SqliteDirectory;
    use crate::sheets::InMemoryMirror;

    fn header() -> Vec<String> {
        vec!["Телеграм".to_owned(), "Инстаграм".to_owned()]
    }

    fn directory() -> (Directory, Arc<InMemoryMirror>, Arc<DirectoryCache>) {
        let store = Arc::new(SqliteDirectory::open_in_memory().unwrap());
        let mirror = Arc::new(InMemoryMirror::with_rows(vec![header()]));
        let cache = Arc::new(DirectoryCache::new());
        let dir = Directory::new(store, mirror.clone(), cache.clone());
        (dir, mirror, cache)
    }

    #[tokio::test]
    async fn submit_writes_store_cache_and_mirror() {
        let (dir, mirror, cache) = directory();
        let address = FieldUpdate::Address("Москва, ул. Ленина, д. 1".into());
        let report = dir.submit("@Ivan", address).await.unwrap();

        assert!(report.mirrored);
        assert_eq!(report.record.handle, "ivan");
        let stored = dir.record_for("ivan").await.unwrap();
        assert_eq!(stored.address, report.record.address);
        assert_eq!(cache.get("ivan").unwrap().unwrap(), report.record);
        assert_eq!(mirror.rows().unwrap()[1][0], "ivan");
    }

    #[tokio::test]
    async fn submit_preserves_other_fields() {
        let (dir, _mirror, _cache) = directory();
        let name = FieldUpdate::Name("Иван".into());
        dir.submit("ivan", name).await.unwrap();
        let report = dir
            .submit("ivan", FieldUpdate::Wishes("коты".into()))
            .await
            .unwrap();
        assert_eq!(report.record.name, "Иван");
        assert_eq!(report.record.wishes, "коты");
    }

    #[tokio::test]
    async fn mirror_failure_keeps_store_write() {
        let (dir, mirror, _cache) = directory();
        mirror.set_fail_push(true);

        let report = dir
            .submit("ivan", FieldUpdate::Name("Иван".into()))
            .await
            .unwrap();
        assert!(!report.mirrored);
        assert_eq!(dir.record_for("ivan").await.unwrap().name, "Иван");
        assert_eq!(mirror.rows().unwrap().len(), 1);
    }
}
