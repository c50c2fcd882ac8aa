//! Immutable configuration snapshots and the results of saving them.

use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

/// The same configuration in two forms, produced together by a store.
///
/// `runtime` is what the rest of the server executes against; `editable` is
/// the form that round-trips through edits and saves. The pair is never
/// updated piecemeal, so the cache installs it as a single unit.
#[derive(Debug)]
pub struct ConfigSnapshot<C> {
    runtime: Arc<C>,
    editable: Arc<C>,
    checksum: String,
}

impl<C> ConfigSnapshot<C> {
    /// Creates a snapshot from both views and the checksum of the bytes they
    /// were produced from.
    pub fn new(runtime: C, editable: C, checksum: impl Into<String>) -> Self {
        Self {
            runtime: Arc::new(runtime),
            editable: Arc::new(editable),
            checksum: checksum.into(),
        }
    }

    /// Returns the view consumed by running components.
    #[must_use]
    pub fn runtime(&self) -> &Arc<C> {
        &self.runtime
    }

    /// Returns the view intended for modification and re-save.
    #[must_use]
    pub fn editable(&self) -> &Arc<C> {
        &self.editable
    }

    /// Returns the checksum of the persisted content behind this snapshot.
    #[must_use]
    pub fn checksum(&self) -> &str {
        &self.checksum
    }
}

// Manual impl: cloning shares both views and must not require `C: Clone`.
impl<C> Clone for ConfigSnapshot<C> {
    fn clone(&self) -> Self {
        Self {
            runtime: Arc::clone(&self.runtime),
            editable: Arc::clone(&self.editable),
            checksum: self.checksum.clone(),
        }
    }
}

/// What a locked write did to the persisted configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveState {
    /// The command changed the configuration and it was persisted.
    Updated,
    /// The command left the configuration as it was; nothing was written.
    Unchanged,
}

impl fmt::Display for SaveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        })
    }
}

/// Outcome of [`ConfigStore::write_with_lock`](crate::ConfigStore::write_with_lock).
#[derive(Debug)]
pub struct SaveResult<C> {
    pub snapshot: ConfigSnapshot<C>,
    pub state: SaveState,
}

/// Validity of the most recent load attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum ConfigValidity {
    Valid,
    Invalid(String),
}

impl ConfigValidity {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// Returns the failure message, if invalid.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Valid => None,
            Self::Invalid(msg) => Some(msg),
        }
    }
}
