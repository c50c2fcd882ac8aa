//! Collaborator traits shared across all confcache crates.
//!
//! Every seam between the cache and the outside world is defined here so that
//! stores, health reporting and listeners depend only on `confcache-types`.

use crate::{ConfigSnapshot, HealthState, Result, SaveResult};
use std::{path::PathBuf, sync::Arc};

/// Loads and persists configuration on behalf of the cache.
///
/// Implementations own parsing, validation and the on-disk format; the cache
/// only sees finished [`ConfigSnapshot`]s.
pub trait ConfigStore: Send + Sync {
    /// The configuration type both snapshot views are expressed in.
    type Config: Default + Send + Sync + 'static;

    /// Reads the persisted configuration.
    ///
    /// Returns `Ok(None)` when nothing changed since the last successful load.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted data is unreadable or malformed.
    fn load(&self) -> Result<Option<ConfigSnapshot<Self::Config>>>;

    /// Replaces the persisted configuration with `content`.
    ///
    /// # Errors
    ///
    /// Returns an error if `content` is invalid or cannot be persisted.
    fn write(&self, content: &str, migrate: bool) -> Result<ConfigSnapshot<Self::Config>>;

    /// Applies `command` on top of `base` and persists the outcome.
    ///
    /// `base` is `None` when the cache has never been populated.
    ///
    /// # Errors
    ///
    /// Returns an error if the command is rejected or the result cannot be
    /// persisted.
    fn write_with_lock(
        &self,
        command: &dyn UpdateConfigCommand<Self::Config>,
        base: Option<&ConfigSnapshot<Self::Config>>,
    ) -> Result<SaveResult<Self::Config>>;

    /// Where the configuration is persisted.
    fn location(&self) -> PathBuf;
}

/// A mutation applied to the editable view during a locked write.
pub trait UpdateConfigCommand<C>: Send + Sync {
    /// Applies the change in place.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Rejected`](crate::ConfigError::Rejected) if the
    /// change cannot be applied to `config`.
    fn update(&self, config: &mut C) -> Result<()>;

    /// Checksum of the revision this command was prepared against, if the
    /// caller wants stale edits refused.
    fn expected_checksum(&self) -> Option<&str> {
        None
    }
}

/// Receives health status updates from the cache.
pub trait HealthSink: Send + Sync {
    fn update(&self, state: HealthState);
}

/// Notified with the runtime view after every successful install.
pub trait ChangeListener<C>: Send + Sync {
    /// # Errors
    ///
    /// Failures are logged by the cache and never reach the code that
    /// triggered the change.
    fn on_config_change(&self, config: &Arc<C>) -> Result<()>;

    /// Name used when logging this listener's failures.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<C, F> ChangeListener<C> for F
where
    F: Fn(&Arc<C>) -> Result<()> + Send + Sync,
{
    fn on_config_change(&self, config: &Arc<C>) -> Result<()> {
        self(config)
    }
}
