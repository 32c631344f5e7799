//! In-memory snapshot of the directory for fast reads and random picks.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::seq::IteratorRandom;

use crate::directory::AddressRecord;
use crate::error::{BotError, Result};
use crate::normalize::normalize_handle;

/// Handle → record map behind a read-write lock.
///
/// Always derived from the store; safe to throw away and rebuild.
#[derive(Debug, Default)]
pub struct DirectoryCache {
    records: RwLock<HashMap<String, AddressRecord>>,
}

impl DirectoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap the whole mapping in one write.
    pub fn replace_all(&self, records: Vec<AddressRecord>) -> Result<()> {
        let fresh: HashMap<String, AddressRecord> = records
            .into_iter()
            .map(|record| (record.handle.clone(), record))
            .collect();
        *self.write()? = fresh;
        Ok(())
    }

    /// Insert or overwrite a single entry.
    pub fn upsert_one(&self, record: AddressRecord) -> Result<()> {
        self.write()?.insert(record.handle.clone(), record);
        Ok(())
    }

    pub fn get(&self, handle: &str) -> Result<Option<AddressRecord>> {
        Ok(self.read()?.get(&normalize_handle(handle)).cloned())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }

    /// Uniformly random record, or [`BotError::EmptyCache`].
    pub fn pick_random(&self) -> Result<AddressRecord> {
        let records = self.read()?;
        records
            .values()
            .choose(&mut rand::thread_rng())
            .cloned()
            .ok_or(BotError::EmptyCache)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, AddressRecord>>> {
        self.records
            .read()
            .map_err(|e| BotError::Lock(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, AddressRecord>>> {
        self.records
            .write()
            .map_err(|e| BotError::Lock(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn record(handle: &str, name: &str) -> AddressRecord {
        AddressRecord {
            handle: handle.to_owned(),
            name: name.to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn empty_cache_pick_fails() {
        let cache = DirectoryCache::new();
        assert!(matches!(cache.pick_random(), Err(BotError::EmptyCache)));
    }

    #[test]
    fn replace_all_drops_old_entries() {
        let cache = DirectoryCache::new();
        cache
            .replace_all(vec![record("a", "A"), record("b", "B")])
            .unwrap();
        cache.replace_all(vec![record("c", "C")]).unwrap();

        assert_eq!(cache.len().unwrap(), 1);
        assert!(cache.get("a").unwrap().is_none());
        assert_eq!(cache.get("@C").unwrap().unwrap().name, "C");
    }

    #[test]
    fn upsert_one_overwrites() {
        let cache = DirectoryCache::new();
        cache.upsert_one(record("a", "old")).unwrap();
        cache.upsert_one(record("a", "new")).unwrap();
        assert_eq!(cache.len().unwrap(), 1);
        assert_eq!(cache.get("a").unwrap().unwrap().name, "new");
    }

    #[test]
    fn pick_random_covers_all_entries() {
        let cache = DirectoryCache::new();
        cache
            .replace_all(vec![record("a", "A"), record("b", "B"), record("c", "C")])
            .unwrap();

        let mut seen = HashSet::new();
        for _ in 0..500 {
            seen.insert(cache.pick_random().unwrap().handle);
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn readers_never_see_partial_replace() {
        let cache = Arc::new(DirectoryCache::new());
        let big: Vec<_> = (0..200).map(|i| record(&format!("h{i}"), "x")).collect();
        let small = vec![record("only", "x")];

        let writer = {
            let cache = Arc::clone(&cache);
            std::thread::spawn(move || {
                for round in 0..100 {
                    let batch = if round % 2 == 0 { big.clone() } else { small.clone() };
                    cache.replace_all(batch).unwrap();
                }
            })
        };
        for _ in 0..1000 {
            let len = cache.len().unwrap();
            assert!(len == 0 || len == 1 || len == 200, "observed {len}");
        }
        writer.join().unwrap();
    }
}
