//! Last-known-good configuration cache.
//!
//! Responsibilities:
//! - Serve the latest installed configuration to readers without locking.
//! - Serialize reloads, saves, locked writes and listener registration
//!   behind a single mutation lock.
//! - Track the outcome of the latest load separately from the configuration
//!   being served, so a stale-but-valid config can coexist with an error.
//! - Fan out each install to every registered listener, isolating failures.
use arc_swap::ArcSwap;
use confcache_types::{
    ChangeListener, ConfigError, ConfigSnapshot, ConfigStore, ConfigValidity, HealthScope,
    HealthSink, HealthState, INVALID_CONFIGURATION, Result, SaveState, UpdateConfigCommand,
};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

/// Shared handle to a registered listener.
pub type Listener<C> = Arc<dyn ChangeListener<C>>;

/// Everything a reader can observe, replaced as a whole on every mutation.
struct CacheState<C> {
    snapshot: Option<Arc<ConfigSnapshot<C>>>,
    last_error: Option<Arc<ConfigError>>,
}

impl<C> CacheState<C> {
    fn empty() -> Self {
        Self {
            snapshot: None,
            last_error: None,
        }
    }
}

/// Caches the configuration produced by a [`ConfigStore`].
pub struct ConfigCache<S: ConfigStore> {
    store: S,
    health: Arc<dyn HealthSink>,
    state: ArcSwap<CacheState<S::Config>>,
    /// The mutation lock. Holding it is required to replace `state`.
    listeners: Mutex<Vec<Listener<S::Config>>>,
}

impl<S: ConfigStore> ConfigCache<S> {
    /// Creates an empty cache. Nothing is loaded until the first
    /// [`reload`](Self::reload), write, or [`for_editing`](Self::for_editing).
    pub fn new(store: S, health: Arc<dyn HealthSink>) -> Self {
        Self {
            store,
            health,
            state: ArcSwap::from_pointee(CacheState::empty()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Returns the runtime view, or a default configuration if nothing has
    /// ever been installed. Never blocks.
    pub fn current(&self) -> Arc<S::Config> {
        match &self.state.load().snapshot {
            Some(snapshot) => Arc::clone(snapshot.runtime()),
            None => Arc::new(S::Config::default()),
        }
    }

    /// Returns the editable view, loading first if the cache was never
    /// populated.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotLoaded`] carrying the last load failure when
    /// no configuration could ever be installed.
    pub fn for_editing(&self) -> Result<Arc<S::Config>> {
        self.ensure_loaded();
        let state = self.state.load();
        match &state.snapshot {
            Some(snapshot) => Ok(Arc::clone(snapshot.editable())),
            None => Err(ConfigError::NotLoaded {
                cause: state.last_error.clone(),
            }),
        }
    }

    /// Attempts a load if nothing has ever been installed.
    pub fn ensure_loaded(&self) {
        if self.state.load().snapshot.is_some() {
            return;
        }
        let listeners = self.lock();
        // Another writer may have installed while we waited.
        if self.state.load().snapshot.is_none() {
            self.load_locked(&listeners);
        }
    }

    /// Reloads from the store.
    ///
    /// Failures are recorded, reported to the health sink and logged; they
    /// never reach the caller, and the previous configuration keeps being
    /// served.
    pub fn reload(&self) {
        let listeners = self.lock();
        self.load_locked(&listeners);
    }

    /// Applies `command` to the current snapshot through the store and
    /// installs the result.
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged; the cache is left untouched.
    pub fn write_with_lock(
        &self,
        command: &dyn UpdateConfigCommand<S::Config>,
    ) -> Result<SaveState> {
        let listeners = self.lock();
        let base = self.state.load().snapshot.clone();
        let result = self.store.write_with_lock(command, base.as_deref())?;
        tracing::debug!(state = %result.state, "[config save] saving config to the cache");
        self.install(&listeners, result.snapshot);
        Ok(result.state)
    }

    /// Overwrites the persisted configuration with `content` and installs it.
    ///
    /// # Errors
    ///
    /// Returns the store's error unchanged; the cache is left untouched.
    pub fn save(&self, content: &str, migrate: bool) -> Result<()> {
        let listeners = self.lock();
        let snapshot = self.store.write(content, migrate)?;
        tracing::debug!("[config save] saving config to the cache");
        self.install(&listeners, snapshot);
        Ok(())
    }

    /// Reports whether the most recent load failed.
    pub fn check_validity(&self) -> ConfigValidity {
        match &self.state.load().last_error {
            Some(e) => ConfigValidity::Invalid(e.to_string()),
            None => ConfigValidity::Valid,
        }
    }

    /// Returns the error recorded by the most recent failed load, if it has
    /// not been cleared by a later success.
    pub fn last_error(&self) -> Option<Arc<ConfigError>> {
        self.state.load().last_error.clone()
    }

    /// Returns the installed snapshot with both views.
    pub fn snapshot(&self) -> Option<Arc<ConfigSnapshot<S::Config>>> {
        self.state.load().snapshot.clone()
    }

    /// Registers `listener`, delivering the current runtime view to it
    /// before returning if a configuration is already installed.
    ///
    /// That first delivery is isolated like any other notification: an error
    /// or panic from the listener is logged, not returned, and the listener
    /// stays registered.
    pub fn register_listener(&self, listener: Listener<S::Config>) {
        let mut listeners = self.lock();
        listeners.push(Arc::clone(&listener));
        if let Some(snapshot) = &self.state.load().snapshot {
            deliver(&listener, snapshot.runtime());
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    /// Drops every registered listener. Intended for resetting test fixtures.
    pub fn clear_listeners(&self) {
        self.lock().clear();
    }

    /// Delivers [`current`](Self::current) to every listener again.
    pub fn renotify_listeners(&self) {
        let listeners = self.lock();
        notify(&listeners, &self.current());
    }

    /// Where the store persists the configuration.
    pub fn file_location(&self) -> PathBuf {
        self.store.location()
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Acquires the mutation lock.
    ///
    /// Listener panics are caught before they can poison it, so a poisoned
    /// lock still guards a well-formed registry.
    fn lock(&self) -> MutexGuard<'_, Vec<Listener<S::Config>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_locked(&self, listeners: &[Listener<S::Config>]) {
        match self.store.load() {
            Ok(Some(snapshot)) => self.install(listeners, snapshot),
            Ok(None) => tracing::debug!("store reported no new configuration"),
            Err(e) => self.record_error(e),
        }
    }

    /// Must be called with the mutation lock held.
    fn install(&self, listeners: &[Listener<S::Config>], snapshot: ConfigSnapshot<S::Config>) {
        let snapshot = Arc::new(snapshot);
        self.state.store(Arc::new(CacheState {
            snapshot: Some(Arc::clone(&snapshot)),
            last_error: None,
        }));
        self.health.update(HealthState::success(HealthScope::InvalidConfig));

        tracing::info!(
            checksum = %snapshot.checksum(),
            listeners = listeners.len(),
            "about to notify config listeners"
        );
        notify(listeners, snapshot.runtime());
        tracing::info!("finished notifying all listeners");
    }

    /// Must be called with the mutation lock held.
    fn record_error(&self, error: ConfigError) {
        let error = Arc::new(error);
        let snapshot = self.state.load().snapshot.clone();
        tracing::warn!(
            location = %self.store.location().display(),
            error = %error,
            serving_previous = snapshot.is_some(),
            "error loading configuration, keeping previous one"
        );
        self.state.store(Arc::new(CacheState {
            snapshot,
            last_error: Some(Arc::clone(&error)),
        }));
        self.health.update(HealthState::error(
            HealthScope::InvalidConfig,
            INVALID_CONFIGURATION,
            error.to_string(),
        ));
    }
}

fn notify<C>(listeners: &[Listener<C>], config: &Arc<C>) {
    for listener in listeners {
        deliver(listener, config);
    }
}

/// Runs one listener, logging instead of propagating its error or panic.
fn deliver<C>(listener: &Listener<C>, config: &Arc<C>) {
    match panic::catch_unwind(AssertUnwindSafe(|| listener.on_config_change(config))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(
            listener = listener.name(),
            error = %e,
            "failed to fire config changed event for listener"
        ),
        Err(payload) => tracing::error!(
            listener = listener.name(),
            panic = panic_message(payload.as_ref()),
            "config changed listener panicked"
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
