//! In-memory [`HealthSink`] keeping the latest state per scope.

use confcache_types::{HealthScope, HealthSink, HealthState};
use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

/// Tracks the current health of every reported scope.
#[derive(Default)]
pub struct ServerHealthService {
    states: Mutex<HashMap<HealthScope, HealthState>>,
}

impl ServerHealthService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last state reported for `scope`.
    pub fn get(&self, scope: &HealthScope) -> Option<HealthState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(scope)
            .cloned()
    }

    /// Returns every scope currently in error.
    pub fn errors(&self) -> Vec<HealthState> {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| !s.is_healthy())
            .cloned()
            .collect()
    }

    pub fn is_healthy(&self) -> bool {
        self.errors().is_empty()
    }
}

impl HealthSink for ServerHealthService {
    fn update(&self, state: HealthState) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let was_healthy = states.get(&state.scope).is_none_or(HealthState::is_healthy);
        match (was_healthy, state.is_healthy()) {
            (true, false) => tracing::warn!(scope = %state.scope, "health degraded"),
            (false, true) => tracing::info!(scope = %state.scope, "health recovered"),
            _ => {}
        }
        states.insert(state.scope.clone(), state);
    }
}
