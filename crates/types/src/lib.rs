//! Core types and traits for the confcache workspace.
//!
//! This crate defines the shared abstractions used across all layers of the
//! configuration cache: the error type, immutable snapshots and save states,
//! health states, and the collaborator traits a store, a health sink and a
//! change listener implement.

pub mod error;
pub mod health;
pub mod snapshot;
pub mod traits;

pub use error::{ConfigError, Result};
pub use health::{HealthScope, HealthState, HealthStatus, INVALID_CONFIGURATION};
pub use snapshot::{ConfigSnapshot, ConfigValidity, SaveResult, SaveState};
pub use traits::{ChangeListener, ConfigStore, HealthSink, UpdateConfigCommand};
