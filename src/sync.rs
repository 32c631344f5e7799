//! Spreadsheet → store → cache reconciliation.
//!
//! One transition, three triggers: startup (fatal on failure), the periodic
//! tick and an on-demand trigger (both logged and retried on the next
//! round). A failed pull leaves the store and the cache untouched.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cache::DirectoryCache;
use crate::directory::DirectoryStore;
use crate::error::{BotError, Result};
use crate::sheets::SheetMirror;

/// Shortest accepted interval between periodic cycles.
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Observable state of the background loop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    /// Live records in the cache after the last success.
    pub records: usize,
    /// Completed cycles, successful or not.
    pub cycles: u64,
}

/// Pull-reconcile-refresh engine.
#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn DirectoryStore>,
    mirror: Arc<dyn SheetMirror>,
    cache: Arc<DirectoryCache>,
}

impl SyncEngine {
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

    /// One sync cycle. Returns the number of live records now cached.
    pub async fn sync_once(&self) -> Result<usize> {
        let pulled = self
            .mirror
            .pull()
            .await
            .map_err(|e| BotError::Sheets(format!("{e:#}")))?;
        let written = self.store.upsert_many(&pulled).await?;
        let live = self.store.list_live().await?;
        let count = live.len();
        self.cache.replace_all(live)?;
        info!(
            mirror = self.mirror.id(),
            pulled = written,
            records = count,
            "directory synced"
        );
        Ok(count)
    }

    /// Initial sync; the caller must not serve traffic if this fails.
    pub async fn startup(&self) -> Result<usize> {
        info!("running initial directory sync");
        self.sync_once().await
    }

    /// Start the periodic loop.
    ///
    /// The first tick is skipped: callers are expected to have run
    /// [`startup`](Self::startup) already.
    pub fn spawn(self, interval: Duration, cancel: CancellationToken) -> SyncHandle {
        let notify = Arc::new(Notify::new());
        let status = Arc::new(RwLock::new(SyncStatus::default()));
        let interval = interval.max(MIN_INTERVAL);

        let join = {
            let notify = Arc::clone(&notify);
            let status = Arc::clone(&status);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                info!(interval_secs = interval.as_secs(), "sync loop started");
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                ticker.tick().await;

                loop {
                    tokio::select! {
                        () = cancel.cancelled() => {
                            info!("sync loop cancelled");
                            break;
                        }
                        _ = ticker.tick() => debug!("periodic sync"),
                        () = notify.notified() => debug!("on-demand sync"),
                    }
                    self.run_cycle(&status).await;
                }
            })
        };

        SyncHandle {
            notify,
            status,
            cancel,
            join,
        }
    }

    async fn run_cycle(&self, status: &RwLock<SyncStatus>) {
        let outcome = self.sync_once().await;
        let mut status = status.write().unwrap_or_else(PoisonError::into_inner);
        status.cycles += 1;
        match outcome {
            Ok(records) => {
                status.last_success_at = Some(Utc::now());
                status.last_error = None;
                status.consecutive_failures = 0;
                status.records = records;
            }
            Err(err) => {
                status.consecutive_failures += 1;
                error!(
                    error = %err,
                    consecutive_failures = status.consecutive_failures,
                    "directory sync failed; retrying next cycle"
                );
                status.last_error = Some(err.to_string());
            }
        }
    }
}

/// Requests an on-demand cycle from outside the [`SyncHandle`] owner.
#[derive(Clone)]
pub struct SyncTrigger(Arc<Notify>);

impl SyncTrigger {
    pub fn trigger(&self) {
        self.0.notify_one();
    }
}

/// Control handle for the running sync loop.
pub struct SyncHandle {
    notify: Arc<Notify>,
    status: Arc<RwLock<SyncStatus>>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl SyncHandle {
    /// Request a cycle now. Requests made while a cycle runs coalesce.
    pub fn trigger(&self) {
        self.notify.notify_one();
    }

    /// Cloneable trigger for signal handlers and other tasks.
    pub fn trigger_source(&self) -> SyncTrigger {
        SyncTrigger(Arc::clone(&self.notify))
    }

    pub fn status(&self) -> SyncStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Cancel the loop and wait for it to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.join.await {
            error!(error = %err, "sync loop task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::directory::{AddressRecord, SqliteDirectory};
    use crate::sheets::InMemoryMirror;

    /// Sheet rows from `|`-separated cells.
    fn rows(data: &[&str]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.split('|').map(str::to_owned).collect())
            .collect()
    }

    fn setup(
        sheet: Vec<Vec<String>>,
    ) -> (
        SyncEngine,
        Arc<SqliteDirectory>,
        Arc<InMemoryMirror>,
        Arc<DirectoryCache>,
    ) {
        let store = Arc::new(SqliteDirectory::open_in_memory().unwrap());
        let mirror = Arc::new(InMemoryMirror::with_rows(sheet));
        let cache = Arc::new(DirectoryCache::new());
        let engine = SyncEngine::new(store.clone(), mirror.clone(), cache.clone());
        (engine, store, mirror, cache)
    }

    async fn wait_for(handle: &SyncHandle, cycles: u64) -> SyncStatus {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let status = handle.status();
                if status.cycles >= cycles {
                    return status;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("sync cycle did not complete")
    }

    #[tokio::test]
    async fn sync_once_fills_store_and_cache() {
        let (engine, store, _mirror, cache) = setup(rows(&[
            "Телеграм|Инстаграм",
            "@Ivan||Иван|Москва||да",
            "maria||Мария|Казань",
        ]));

        assert_eq!(engine.sync_once().await.unwrap(), 2);
        assert_eq!(cache.len().unwrap(), 2);
        assert!(store.get_by_handle("ivan").await.unwrap().approved);
    }

    #[tokio::test]
    async fn cache_keeps_local_only_records() {
        let (engine, store, _mirror, cache) = setup(rows(&["Телеграм", "ivan||Иван"]));
        store.upsert(&AddressRecord::new("local")).await.unwrap();

        engine.sync_once().await.unwrap();
        assert!(cache.get("local").unwrap().is_some());
        assert!(cache.get("ivan").unwrap().is_some());
    }

    #[tokio::test]
    async fn failed_pull_touches_nothing() {
        let (engine, store, mirror, cache) = setup(rows(&["Телеграм", "ivan||Иван"]));
        engine.sync_once().await.unwrap();

        mirror
            .set_rows(rows(&["Телеграм", "ivan||Иван Новый", "new||N"]))
            .unwrap();
        mirror.set_fail_pull(true);

        let err = engine.sync_once().await.unwrap_err();
        assert!(matches!(err, BotError::Sheets(_)));
        assert_eq!(store.get_by_handle("ivan").await.unwrap().name, "Иван");
        assert!(store.get_by_handle("new").await.unwrap().is_empty());
        assert_eq!(cache.len().unwrap(), 1);
        assert_eq!(cache.get("ivan").unwrap().unwrap().name, "Иван");
    }

    #[tokio::test]
    async fn startup_fails_on_empty_sheet() {
        let (engine, _store, _mirror, cache) = setup(Vec::new());
        assert!(engine.startup().await.is_err());
        assert!(cache.is_empty().unwrap());
    }

    #[tokio::test]
    async fn loop_survives_failures_and_honours_trigger() {
        let (engine, _store, mirror, cache) = setup(rows(&["Телеграм", "ivan||Иван"]));
        let handle = engine.spawn(Duration::from_secs(3600), CancellationToken::new());

        mirror.set_fail_pull(true);
        handle.trigger();
        let status = wait_for(&handle, 1).await;
        assert_eq!(status.consecutive_failures, 1);
        assert!(status.last_error.is_some());
        assert!(cache.is_empty().unwrap());

        mirror.set_fail_pull(false);
        handle.trigger();
        let status = wait_for(&handle, 2).await;
        assert_eq!(status.consecutive_failures, 0);
        assert_eq!(status.records, 1);
        assert!(status.last_success_at.is_some());

        handle.shutdown().await;
    }
}
