//! Unified error type for the confcache workspace.

use std::{path::PathBuf, sync::Arc};
use thiserror::Error;

/// Enumerates all error kinds that can occur across confcache crates.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The persisted configuration could not be read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persisted configuration is malformed.
    #[error("parse error: {0}")]
    Parse(String),

    /// The configuration could not be serialized for persisting.
    #[error("serialization error: {0}")]
    Serialize(String),

    /// An update command refused to apply its change.
    #[error("update rejected: {0}")]
    Rejected(String),

    /// The edit was prepared against a revision that is no longer current.
    #[error("configuration changed since it was read (expected {expected}, found {actual})")]
    Conflict { expected: String, actual: String },

    /// A change listener failed to apply a new configuration.
    #[error("listener failed: {0}")]
    Listener(String),

    /// No configuration has ever been installed, so there is nothing to edit.
    ///
    /// Carries the most recent load failure, if any, as its source.
    #[error("invalid config file: no configuration has been loaded")]
    NotLoaded {
        #[source]
        cause: Option<Arc<ConfigError>>,
    },
}

impl ConfigError {
    /// Builds an [`ConfigError::Io`] for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` for the one error that signals the cache was never populated.
    #[must_use]
    pub fn is_not_loaded(&self) -> bool {
        matches!(self, Self::NotLoaded { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, ConfigError>;
