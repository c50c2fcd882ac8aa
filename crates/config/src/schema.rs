use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Schema version written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Prefix of environment variables that override the runtime view.
///
/// Nested keys are separated by `__`, e.g. `CONFCACHE_SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "CONFCACHE_";

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    8153
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("artifacts")
}
fn default_group() -> String {
    "defaultGroup".to_string()
}

/// Server-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (defaults to `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port (defaults to 8153).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory artifacts are stored under.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
    /// Jobs running longer than this are cancelled. `None` means never.
    #[serde(default)]
    pub job_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            artifacts_dir: default_artifacts_dir(),
            job_timeout_secs: None,
        }
    }
}

/// A single pipeline definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default = "default_group")]
    pub group: String,
    /// Repository URLs the pipeline builds from.
    #[serde(default)]
    pub materials: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl PipelineConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: default_group(),
            materials: Vec::new(),
            enabled: true,
        }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            server: ServerConfig::default(),
            pipelines: Vec::new(),
        }
    }
}

impl Config {
    /// Parses the editable form from a YAML string, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the YAML is invalid or extraction fails.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .extract()
    }

    /// Parses the runtime form: defaults, then YAML, then `CONFCACHE_*`
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the YAML is invalid, an override has the
    /// wrong type, or extraction fails.
    #[allow(clippy::result_large_err)]
    pub fn runtime_from_yaml(yaml: &str) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Env, Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
    }

    /// Loads the editable form from a file path, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be read or parsed.
    #[allow(clippy::result_large_err)]
    pub fn from_file(path: &Path) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .extract()
    }

    /// Serializes the configuration back to YAML.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_yaml::Error`] if a value cannot be represented.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Looks up a pipeline by name.
    #[must_use]
    pub fn pipeline(&self, name: &str) -> Option<&PipelineConfig> {
        self.pipelines.iter().find(|p| p.name == name)
    }
}
