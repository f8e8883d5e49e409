//! Cached full dataset for dashboards and leaderboards
//!
//! The dataset is fetched with [`fetch_all_email_records`] and kept until it
//! is older than the refresh interval. Refreshes are single-flight: callers
//! that queue behind a running refresh get its result instead of starting
//! another full fetch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{fetch_all_email_records, FullDataset, MagusApi};
use crate::config::InboxConfig;
use crate::error::Result;

struct Entry {
    dataset: Arc<FullDataset>,
    fetched_at: Instant,
    updated_at: DateTime<Utc>,
}

pub struct EmailCache {
    api: Arc<dyn MagusApi>,
    batch: u32,
    max_rows: usize,
    interval: Duration,
    entry: RwLock<Option<Entry>>,
    /// Bumped after every completed fetch
    completed: AtomicU64,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl EmailCache {
    pub fn new(api: Arc<dyn MagusApi>, config: &InboxConfig) -> Self {
        Self {
            api,
            batch: config.full_fetch_batch,
            max_rows: config.full_fetch_max_rows,
            interval: Duration::from_secs(config.refresh_interval_secs),
            entry: RwLock::new(None),
            completed: AtomicU64::new(0),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Override the staleness window and loop period
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When the cached dataset was fetched
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.entry.read().as_ref().map(|e| e.updated_at)
    }

    /// Cached dataset if still fresh
    pub fn peek(&self) -> Option<Arc<FullDataset>> {
        self.entry
            .read()
            .as_ref()
            .filter(|e| e.fetched_at.elapsed() < self.interval)
            .map(|e| e.dataset.clone())
    }

    /// Cached dataset, fetching it first when missing or stale
    pub async fn get(&self) -> Result<Arc<FullDataset>> {
        if let Some(dataset) = self.peek() {
            debug!("Email cache hit");
            return Ok(dataset);
        }

        let _guard = self.refresh_lock.lock().await;
        // another caller may have filled it while we waited
        if let Some(dataset) = self.peek() {
            return Ok(dataset);
        }
        self.fetch_and_store().await
    }

    /// Force a fetch, joining one that is already running
    pub async fn refresh(&self) -> Result<Arc<FullDataset>> {
        let seen = self.completed.load(Ordering::SeqCst);
        let _guard = self.refresh_lock.lock().await;

        if self.completed.load(Ordering::SeqCst) != seen {
            if let Some(entry) = self.entry.read().as_ref() {
                debug!("Joined an in-flight email cache refresh");
                return Ok(entry.dataset.clone());
            }
        }
        self.fetch_and_store().await
    }

    /// Refresh every interval until the handle is dropped
    pub fn spawn_refresh_loop(self: &Arc<Self>) -> RefreshLoop {
        let cache = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cache.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = cache.refresh().await {
                    warn!("Email cache refresh failed: {}", e);
                }
            }
        });
        RefreshLoop { task }
    }

    async fn fetch_and_store(&self) -> Result<Arc<FullDataset>> {
        let started = Instant::now();
        let dataset =
            fetch_all_email_records(self.api.as_ref(), self.batch, self.max_rows).await?;
        let dataset = Arc::new(dataset);

        *self.entry.write() = Some(Entry {
            dataset: dataset.clone(),
            fetched_at: Instant::now(),
            updated_at: Utc::now(),
        });
        self.completed.fetch_add(1, Ordering::SeqCst);

        info!(
            "Email cache refreshed: {} records in {:?}",
            dataset.scanned(),
            started.elapsed()
        );
        Ok(dataset)
    }
}

/// Background refresh task, aborted on drop
pub struct RefreshLoop {
    task: JoinHandle<()>,
}

impl RefreshLoop {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for RefreshLoop {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{record, FakeApi};

    fn cache(api: Arc<FakeApi>) -> EmailCache {
        EmailCache::new(api, &InboxConfig::default())
    }

    fn fixture() -> Arc<FakeApi> {
        Arc::new(FakeApi::new(vec![
            record("a", "2025-01-10T09:15:00", "auto_processed"),
            record("b", "2025-01-10T09:47:00", "needs_human_decision"),
            record("c", "2025-01-10T10:02:00", "human_rejected"),
        ]))
    }

    #[tokio::test]
    async fn test_get_serves_from_cache() {
        let api = fixture();
        let cache = cache(api.clone());
        assert!(cache.last_updated().is_none());

        let first = cache.get().await.unwrap();
        let second = cache.get().await.unwrap();
        assert_eq!(first.scanned(), 3);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(api.calls(), vec!["list:100:0"]);
        assert!(cache.last_updated().is_some());
    }

    #[tokio::test]
    async fn test_stale_entry_is_refetched() {
        let api = fixture();
        let cache = cache(api.clone()).with_interval(Duration::ZERO);
        cache.get().await.unwrap();
        cache.get().await.unwrap();
        assert_eq!(api.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_forces_fetch() {
        let api = fixture();
        let cache = cache(api.clone());
        cache.get().await.unwrap();
        cache.refresh().await.unwrap();
        assert_eq!(api.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_overlapping_refreshes_share_one_fetch() {
        let api = fixture();
        let cache = cache(api.clone());
        let gate = api.gate_next_call();

        let (a, b, ()) = tokio::join!(cache.refresh(), cache.refresh(), async {
            gate.entered.notified().await;
            gate.release.notify_one();
        });

        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(api.calls(), vec!["list:100:0"]);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_dataset() {
        let api = fixture();
        let cache = cache(api.clone());
        cache.get().await.unwrap();

        api.set_failure(Some(503));
        assert!(cache.refresh().await.is_err());
        assert_eq!(cache.peek().map(|d| d.scanned()), Some(3));
    }

    #[tokio::test]
    async fn test_refresh_loop_stops_on_drop() {
        let api = fixture();
        let cache = Arc::new(cache(api.clone()).with_interval(Duration::from_millis(20)));

        let handle = cache.spawn_refresh_loop();
        tokio::time::sleep(Duration::from_millis(90)).await;
        assert!(api.calls().len() >= 2);
        assert!(!handle.is_finished());

        drop(handle);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let after_drop = api.calls().len();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(api.calls().len(), after_drop);
    }
}
