//! Update commands applied to the editable view during a locked write.

use crate::schema::{Config, PipelineConfig};
use confcache_types::{ConfigError, Result, UpdateConfigCommand};

/// Changes the server listen port.
#[derive(Debug, Clone, Copy)]
pub struct SetServerPort(pub u16);

impl UpdateConfigCommand<Config> for SetServerPort {
    fn update(&self, config: &mut Config) -> Result<()> {
        if self.0 == 0 {
            return Err(ConfigError::Rejected("port must be non-zero".into()));
        }
        config.server.port = self.0;
        Ok(())
    }
}

/// Appends a pipeline; names must be unique.
#[derive(Debug, Clone)]
pub struct AddPipeline(pub PipelineConfig);

impl UpdateConfigCommand<Config> for AddPipeline {
    fn update(&self, config: &mut Config) -> Result<()> {
        if config.pipeline(&self.0.name).is_some() {
            return Err(ConfigError::Rejected(format!(
                "pipeline '{}' already exists",
                self.0.name
            )));
        }
        config.pipelines.push(self.0.clone());
        Ok(())
    }
}

/// Removes a pipeline by name.
#[derive(Debug, Clone)]
pub struct RemovePipeline(pub String);

impl UpdateConfigCommand<Config> for RemovePipeline {
    fn update(&self, config: &mut Config) -> Result<()> {
        let before = config.pipelines.len();
        config.pipelines.retain(|p| p.name != self.0);
        if config.pipelines.len() == before {
            return Err(ConfigError::Rejected(format!(
                "pipeline '{}' does not exist",
                self.0
            )));
        }
        Ok(())
    }
}

/// Adapts a closure into a command.
pub struct FnCommand<F>(pub F);

impl<F> UpdateConfigCommand<Config> for FnCommand<F>
where
    F: Fn(&mut Config) -> Result<()> + Send + Sync,
{
    fn update(&self, config: &mut Config) -> Result<()> {
        (self.0)(config)
    }
}

/// Wraps a command so it is refused unless the cached revision still has
/// the given checksum.
pub struct ExpectChecksum<T> {
    inner: T,
    checksum: String,
}

impl<T> ExpectChecksum<T> {
    pub fn new(inner: T, checksum: impl Into<String>) -> Self {
        Self {
            inner,
            checksum: checksum.into(),
        }
    }
}

impl<T: UpdateConfigCommand<Config>> UpdateConfigCommand<Config> for ExpectChecksum<T> {
    fn update(&self, config: &mut Config) -> Result<()> {
        self.inner.update(config)
    }

    fn expected_checksum(&self) -> Option<&str> {
        Some(&self.checksum)
    }
}
