//! Process-local mirror holding raw sheet rows.
//!
//! Used for offline runs and tests. Behaves like the remote sheet: same row
//! codec, same header handling, same zero-row failure.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{SheetMirror, find_row, record_to_row, rows_to_records};
use crate::directory::AddressRecord;

/// In-memory sheet with switchable failures.
#[derive(Default)]
pub struct InMemoryMirror {
    rows: Mutex<Vec<Vec<String>>>,
    fail_pull: AtomicBool,
    fail_push: AtomicBool,
    pushes: AtomicUsize,
}

impl InMemoryMirror {
    /// Mirror pre-filled with `rows` (header included, if wanted).
    pub fn with_rows(rows: Vec<Vec<String>>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Self::default()
        }
    }

    /// Snapshot of the current rows.
    pub fn rows(&self) -> anyhow::Result<Vec<Vec<String>>> {
        Ok(self.lock()?.clone())
    }

    /// Replace all rows.
    pub fn set_rows(&self, rows: Vec<Vec<String>>) -> anyhow::Result<()> {
        *self.lock()? = rows;
        Ok(())
    }

    pub fn set_fail_pull(&self, fail: bool) {
        self.fail_pull.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_push(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::SeqCst);
    }

    /// Successful pushes so far.
    pub fn push_count(&self) -> usize {
        self.pushes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Vec<Vec<String>>>> {
        self.rows
            .lock()
            .map_err(|e| anyhow::anyhow!("mirror rows lock poisoned: {e}"))
    }
}

#[async_trait]
impl SheetMirror for InMemoryMirror {
    fn id(&self) -> &'static str {
        "memory"
    }

    async fn pull(&self) -> anyhow::Result<Vec<AddressRecord>> {
        if self.fail_pull.load(Ordering::SeqCst) {
            anyhow::bail!("simulated pull failure");
        }
        let rows = self.lock()?;
        Ok(rows_to_records(&rows)?)
    }

    async fn push(&self, record: &AddressRecord) -> anyhow::Result<()> {
        if self.fail_push.load(Ordering::SeqCst) {
            anyhow::bail!("simulated push failure");
        }
        let mut rows = self.lock()?;
        if rows.is_empty() {
            anyhow::bail!("sheet has no rows");
        }

        let data = record_to_row(record);
        match find_row(&rows, &record.handle) {
            Some(index) => {
                let row = &mut rows[index];
                if row.len() < data.len() {
                    row.resize(data.len(), String::new());
                }
                for (cell, value) in row.iter_mut().zip(data) {
                    *cell = value;
                }
            }
            None => rows.push(data),
        }
        self.pushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn header() -> Vec<String> {
        vec!["Телеграм".to_owned(), "Инстаграм".to_owned()]
    }

    #[tokio::test]
    async fn push_updates_in_place_and_keeps_approval() {
        let mirror = InMemoryMirror::with_rows(vec![
            header(),
            vec!["ivan", "", "Иван", "old", "", "да"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
        ]);
        let record = AddressRecord {
            handle: "ivan".to_owned(),
            name: "Иван".to_owned(),
            address: "new address".to_owned(),
            ..Default::default()
        };
        mirror.push(&record).await.unwrap();

        let rows = mirror.rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][3], "new address");
        assert_eq!(rows[1][5], "да");
        assert_eq!(mirror.push_count(), 1);

        let pulled = mirror.pull().await.unwrap();
        assert!(pulled[0].approved);
    }

    #[tokio::test]
    async fn push_appends_unknown_handle() {
        let mirror = InMemoryMirror::with_rows(vec![header()]);
        mirror.push(&AddressRecord::new("maria")).await.unwrap();
        assert_eq!(mirror.rows().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failures_are_switchable() {
        let mirror = InMemoryMirror::with_rows(vec![header()]);
        mirror.set_fail_pull(true);
        mirror.set_fail_push(true);
        assert!(mirror.pull().await.is_err());
        assert!(mirror.push(&AddressRecord::new("x")).await.is_err());
        assert_eq!(mirror.push_count(), 0);

        mirror.set_fail_pull(false);
        assert!(mirror.pull().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_sheet_fails() {
        let mirror = InMemoryMirror::default();
        assert!(mirror.pull().await.is_err());
        assert!(mirror.push(&AddressRecord::new("x")).await.is_err());
    }
}
