use crate::cache::ConfigCache;
use confcache_types::ConfigStore;
use notify::{RecommendedWatcher, RecursiveMode, Watcher as _};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, mpsc},
};

/// Watches the store's file and triggers a cache reload when it changes.
pub struct ConfigWatcher<S: ConfigStore> {
    /// Cache to reload.
    cache: Arc<ConfigCache<S>>,
    /// Path to the configuration file.
    path: PathBuf,
}

impl<S: ConfigStore + 'static> ConfigWatcher<S> {
    /// Creates a watcher for the file the cache's store persists to.
    pub fn new(cache: Arc<ConfigCache<S>>) -> Self {
        let path = cache.file_location();
        Self { cache, path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Starts watching. Reloads run on the tokio blocking pool, so this must
    /// be called from within a tokio runtime.
    ///
    /// The parent directory is watched rather than the file itself so that
    /// atomic replace-by-rename saves are still observed. Watching stops when
    /// the returned watcher is dropped.
    ///
    /// # Errors
    ///
    /// Returns a [`notify::Error`] if the OS watcher cannot be created or the
    /// directory cannot be registered.
    pub fn watch(self) -> notify::Result<RecommendedWatcher> {
        let (tx, rx) = mpsc::channel();
        let file_name = self.path.file_name().map(ToOwned::to_owned);

        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    let relevant = (event.kind.is_modify() || event.kind.is_create())
                        && event
                            .paths
                            .iter()
                            .any(|p| p.file_name() == file_name.as_deref());
                    if relevant {
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = %e, "config watch error"),
            })?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        let cache = self.cache;
        tokio::task::spawn_blocking(move || {
            while rx.recv().is_ok() {
                // One reload covers a burst of events.
                while rx.try_recv().is_ok() {}
                tracing::info!("config file change detected, reloading");
                cache.reload();
            }
        });

        tracing::info!(path = %self.path.display(), "config watcher started");
        Ok(watcher)
    }
}
