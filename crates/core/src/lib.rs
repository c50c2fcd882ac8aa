//! The confcache configuration cache.
//!
//! [`ConfigCache`] keeps the last successfully loaded configuration in an
//! `arc-swap` cell so readers never block, while reloads, saves and locked
//! writes are serialized behind a single mutation lock. [`ReloadScheduler`]
//! and [`ConfigWatcher`] drive reloads from a timer or from file changes.

pub mod cache;
pub mod health;
pub mod scheduler;
pub mod watcher;

pub use cache::{ConfigCache, Listener};
pub use health::ServerHealthService;
pub use scheduler::ReloadScheduler;
pub use watcher::ConfigWatcher;
