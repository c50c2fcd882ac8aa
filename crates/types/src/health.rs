//! Health states reported to a [`HealthSink`](crate::HealthSink).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error message reported while the persisted configuration cannot be loaded.
pub const INVALID_CONFIGURATION: &str = "Invalid Configuration";

/// The area of the server a health state describes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthScope {
    /// Validity of the persisted configuration.
    InvalidConfig,
}

impl fmt::Display for HealthScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig => f.write_str("invalid-config"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Error { message: String, description: String },
}

/// A single status update for one [`HealthScope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthState {
    pub scope: HealthScope,
    pub status: HealthStatus,
}

impl HealthState {
    #[must_use]
    pub fn success(scope: HealthScope) -> Self {
        Self {
            scope,
            status: HealthStatus::Healthy,
        }
    }

    pub fn error(
        scope: HealthScope,
        message: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            status: HealthStatus::Error {
                message: message.into(),
                description: description.into(),
            },
        }
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthStatus::Healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_healthy() {
        assert!(HealthState::success(HealthScope::InvalidConfig).is_healthy());
    }

    #[test]
    fn test_error_keeps_message_and_description() {
        let s = HealthState::error(HealthScope::InvalidConfig, INVALID_CONFIGURATION, "bad yaml");
        assert!(!s.is_healthy());
        assert_eq!(
            s.status,
            HealthStatus::Error {
                message: "Invalid Configuration".into(),
                description: "bad yaml".into(),
            }
        );
    }

    #[test]
    fn test_scope_display() {
        assert_eq!(HealthScope::InvalidConfig.to_string(), "invalid-config");
    }
}
