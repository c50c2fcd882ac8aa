//! Periodic reload driver.

use crate::cache::ConfigCache;
use confcache_types::ConfigStore;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Calls [`ConfigCache::reload`] on a fixed cadence.
///
/// Each reload runs on the blocking pool and is awaited before the next tick,
/// so reloads issued by one scheduler never overlap. Ticks missed while a
/// reload was slow are skipped rather than replayed.
#[derive(Debug, Clone, Copy)]
pub struct ReloadScheduler {
    interval: Duration,
}

impl ReloadScheduler {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(MIN_INTERVAL),
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawns the reload loop. The first reload happens immediately.
    ///
    /// The loop exits once `shutdown` carries `true` or its sender is dropped.
    pub fn spawn<S>(
        self,
        cache: Arc<ConfigCache<S>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()>
    where
        S: ConfigStore + 'static,
    {
        tokio::spawn(async move {
            let mut ticker = time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(interval = ?self.interval, "reload scheduler started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let cache = Arc::clone(&cache);
                        if let Err(e) = tokio::task::spawn_blocking(move || cache.reload()).await {
                            tracing::error!(error = %e, "reload task did not complete");
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("reload scheduler stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ServerHealthService;
    use confcache_config::FileConfigStore;
    use std::{path::Path, time::Instant};

    fn write_config(path: &Path, content: &str) {
        std::fs::write(path, content).unwrap();
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cond()
    }

    fn make_cache(path: &Path) -> Arc<ConfigCache<FileConfigStore>> {
        Arc::new(ConfigCache::new(
            FileConfigStore::new(path),
            Arc::new(ServerHealthService::new()),
        ))
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        assert_eq!(ReloadScheduler::new(Duration::ZERO).interval(), MIN_INTERVAL);
    }

    #[tokio::test]
    async fn test_scheduler_loads_and_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        write_config(&path, "pipelines:\n  - name: build\n");
        let cache = make_cache(&path);

        let (tx, rx) = watch::channel(false);
        let handle =
            ReloadScheduler::new(Duration::from_millis(20)).spawn(Arc::clone(&cache), rx);

        assert!(wait_until(|| cache.current().pipeline("build").is_some()).await);

        write_config(&path, "pipelines:\n  - name: deploy\n");
        assert!(wait_until(|| cache.current().pipeline("deploy").is_some()).await);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_scheduler_survives_broken_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        write_config(&path, "pipelines:\n  - name: build\n");
        let cache = make_cache(&path);

        let (tx, rx) = watch::channel(false);
        let handle =
            ReloadScheduler::new(Duration::from_millis(20)).spawn(Arc::clone(&cache), rx);
        assert!(wait_until(|| cache.current().pipeline("build").is_some()).await);

        write_config(&path, "pipelines: [unclosed\n");
        assert!(wait_until(|| !cache.check_validity().is_valid()).await);
        assert!(cache.current().pipeline("build").is_some());

        write_config(&path, "pipelines:\n  - name: fixed\n");
        assert!(wait_until(|| cache.check_validity().is_valid()).await);
        assert!(cache.current().pipeline("fixed").is_some());

        drop(tx);
        handle.await.unwrap();
    }
}
