//! YAML file-backed [`ConfigStore`].

use crate::schema::{CURRENT_SCHEMA_VERSION, Config};
use confcache_types::{
    ConfigError, ConfigSnapshot, ConfigStore, Result, SaveResult, SaveState, UpdateConfigCommand,
};
use sha2::{Digest as _, Sha256};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

/// Hex-encoded SHA-256 of persisted configuration bytes.
#[must_use]
pub fn checksum(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// Persists [`Config`] as a single YAML file.
///
/// `load` only produces a snapshot when the file content differs from the
/// last snapshot this store handed out for installation. A failed load
/// forgets that checksum, so restoring the previous content is picked up
/// again and clears the error.
pub struct FileConfigStore {
    path: PathBuf,
    /// Checksum of the last snapshot returned to the caller.
    last_checksum: Mutex<Option<String>>,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_checksum: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path).map_err(|e| ConfigError::io(&self.path, e))
    }

    /// Writes via a sibling temp file so readers never see a truncated file.
    fn persist(&self, content: &str) -> Result<()> {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, content).map_err(|e| ConfigError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| ConfigError::io(&self.path, e))
    }

    fn last_checksum(&self) -> Option<String> {
        self.last_checksum
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_last_checksum(&self, checksum: Option<String>) {
        *self
            .last_checksum
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = checksum;
    }

    fn record(&self, checksum: &str) {
        self.set_last_checksum(Some(checksum.to_string()));
    }

    /// Reads and parses the file unconditionally. Records nothing; the
    /// caller decides whether the snapshot is handed out.
    fn read_snapshot(&self) -> Result<ConfigSnapshot<Config>> {
        let content = self.read()?;
        parse_snapshot(&content)
    }
}

fn parse_snapshot(content: &str) -> Result<ConfigSnapshot<Config>> {
    let editable = Config::from_yaml(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let runtime =
        Config::runtime_from_yaml(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    Ok(ConfigSnapshot::new(runtime, editable, checksum(content)))
}

impl ConfigStore for FileConfigStore {
    type Config = Config;

    fn load(&self) -> Result<Option<ConfigSnapshot<Config>>> {
        let content = match self.read() {
            Ok(content) => content,
            Err(e) => {
                self.set_last_checksum(None);
                return Err(e);
            }
        };
        let sum = checksum(&content);
        if self.last_checksum().as_deref() == Some(sum.as_str()) {
            tracing::debug!(path = %self.path.display(), "config file unchanged, skipping parse");
            return Ok(None);
        }
        let snapshot = match parse_snapshot(&content) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.set_last_checksum(None);
                return Err(e);
            }
        };
        self.record(&sum);
        tracing::debug!(path = %self.path.display(), checksum = %sum, "config file parsed");
        Ok(Some(snapshot))
    }

    fn write(&self, content: &str, migrate: bool) -> Result<ConfigSnapshot<Config>> {
        let mut editable =
            Config::from_yaml(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        let content = if migrate && editable.schema_version < CURRENT_SCHEMA_VERSION {
            tracing::info!(
                from = editable.schema_version,
                to = CURRENT_SCHEMA_VERSION,
                "upgrading schema version on save"
            );
            editable.schema_version = CURRENT_SCHEMA_VERSION;
            editable
                .to_yaml()
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            content.to_string()
        };

        let snapshot = parse_snapshot(&content)?;
        self.persist(&content)?;
        self.record(snapshot.checksum());
        Ok(snapshot)
    }

    fn write_with_lock(
        &self,
        command: &dyn UpdateConfigCommand<Config>,
        base: Option<&ConfigSnapshot<Config>>,
    ) -> Result<SaveResult<Config>> {
        let base = match base {
            Some(b) => b.clone(),
            None => self.read_snapshot()?,
        };

        if let Some(expected) = command.expected_checksum()
            && expected != base.checksum()
        {
            return Err(ConfigError::Conflict {
                expected: expected.to_string(),
                actual: base.checksum().to_string(),
            });
        }

        let mut edited = Config::clone(base.editable());
        command.update(&mut edited)?;
        if edited == **base.editable() {
            self.record(base.checksum());
            return Ok(SaveResult {
                snapshot: base,
                state: SaveState::Unchanged,
            });
        }

        let content = edited
            .to_yaml()
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        let snapshot = parse_snapshot(&content)?;
        self.persist(&content)?;
        self.record(snapshot.checksum());
        Ok(SaveResult {
            snapshot,
            state: SaveState::Updated,
        })
    }

    fn location(&self) -> PathBuf {
        std::path::absolute(&self.path).unwrap_or_else(|_| self.path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{AddPipeline, ExpectChecksum, SetServerPort};
    use crate::schema::PipelineConfig;
    use std::io::Write as _;

    fn write_config(path: &Path, content: &str) {
        let mut f = fs::File::create(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    fn store_with(content: &str) -> (tempfile::TempDir, FileConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        write_config(&path, content);
        (dir, FileConfigStore::new(path))
    }

    #[test]
    fn test_load_parses_file() {
        let (_dir, store) = store_with("server:\n  port: 9999\n");
        let snap = store.load().unwrap().unwrap();
        assert_eq!(snap.editable().server.port, 9999);
        assert_eq!(snap.checksum(), checksum("server:\n  port: 9999\n"));
    }

    #[test]
    fn test_load_unchanged_returns_none() {
        let (_dir, store) = store_with("server:\n  port: 9999\n");
        assert!(store.load().unwrap().is_some());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_load_after_change_returns_new_snapshot() {
        let (_dir, store) = store_with("server:\n  port: 1111\n");
        store.load().unwrap();
        write_config(store.path(), "server:\n  port: 2222\n");
        let snap = store.load().unwrap().unwrap();
        assert_eq!(snap.editable().server.port, 2222);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileConfigStore::new(dir.path().join("absent.yaml"));
        let err = store.load().unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_broken_file_keeps_failing() {
        let (_dir, store) = store_with("server: [unclosed\n");
        assert!(matches!(store.load().unwrap_err(), ConfigError::Parse(_)));
        assert!(matches!(store.load().unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_write_persists_and_records_checksum() {
        let (_dir, store) = store_with("server:\n  port: 1111\n");
        let snap = store.write("server:\n  port: 3333\n", false).unwrap();
        assert_eq!(snap.editable().server.port, 3333);
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "server:\n  port: 3333\n"
        );
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_write_invalid_content_leaves_file() {
        let (_dir, store) = store_with("server:\n  port: 1111\n");
        let err = store.write("server:\n  port: nope\n", false).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "server:\n  port: 1111\n"
        );
    }

    #[test]
    fn test_write_with_migrate_stamps_version() {
        let (_dir, store) = store_with("schema_version: 1\n");
        let snap = store.write("schema_version: 1\n", true).unwrap();
        assert_eq!(snap.editable().schema_version, CURRENT_SCHEMA_VERSION);
        let on_disk = Config::from_file(store.path()).unwrap();
        assert_eq!(on_disk.schema_version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_write_without_migrate_keeps_version() {
        let (_dir, store) = store_with("schema_version: 1\n");
        let snap = store.write("schema_version: 1\n", false).unwrap();
        assert_eq!(snap.editable().schema_version, 1);
    }

    #[test]
    fn test_write_with_lock_updates() {
        let (_dir, store) = store_with("server:\n  port: 1111\n");
        let base = store.load().unwrap().unwrap();
        let result = store
            .write_with_lock(&SetServerPort(4444), Some(&base))
            .unwrap();
        assert_eq!(result.state, SaveState::Updated);
        assert_eq!(result.snapshot.editable().server.port, 4444);
        assert_eq!(Config::from_file(store.path()).unwrap().server.port, 4444);
    }

    #[test]
    fn test_write_with_lock_noop_is_unchanged() {
        let (_dir, store) = store_with("server:\n  port: 1111\n");
        let base = store.load().unwrap().unwrap();
        let result = store
            .write_with_lock(&SetServerPort(1111), Some(&base))
            .unwrap();
        assert_eq!(result.state, SaveState::Unchanged);
        assert!(std::sync::Arc::ptr_eq(
            result.snapshot.editable(),
            base.editable()
        ));
        assert_eq!(
            fs::read_to_string(store.path()).unwrap(),
            "server:\n  port: 1111\n"
        );
    }

    #[test]
    fn test_write_with_lock_without_base_reads_file() {
        let (_dir, store) = store_with("server:\n  port: 1111\n");
        let result = store
            .write_with_lock(&AddPipeline(PipelineConfig::new("build")), None)
            .unwrap();
        assert_eq!(result.state, SaveState::Updated);
        let edited = result.snapshot.editable();
        assert_eq!(edited.server.port, 1111);
        assert!(edited.pipeline("build").is_some());
    }

    #[test]
    fn test_write_with_lock_rejected_command() {
        let (_dir, store) = store_with("server:\n  port: 1111\n");
        let base = store.load().unwrap().unwrap();
        let err = store
            .write_with_lock(&SetServerPort(0), Some(&base))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Rejected(_)));
    }

    #[test]
    fn test_write_with_lock_stale_checksum_conflicts() {
        let (_dir, store) = store_with("server:\n  port: 1111\n");
        let base = store.load().unwrap().unwrap();
        let cmd = ExpectChecksum::new(SetServerPort(2222), "stale");
        let err = store.write_with_lock(&cmd, Some(&base)).unwrap_err();
        assert!(matches!(err, ConfigError::Conflict { .. }));

        let cmd = ExpectChecksum::new(SetServerPort(2222), base.checksum());
        let result = store.write_with_lock(&cmd, Some(&base)).unwrap();
        assert_eq!(result.state, SaveState::Updated);
    }

    #[test]
    fn test_load_after_failure_rereads_restored_content() {
        let good = "server:\n  port: 1111\n";
        let (_dir, store) = store_with(good);
        assert!(store.load().unwrap().is_some());

        write_config(store.path(), "server: [unclosed\n");
        assert!(matches!(store.load().unwrap_err(), ConfigError::Parse(_)));

        write_config(store.path(), good);
        let snap = store.load().unwrap().unwrap();
        assert_eq!(snap.checksum(), checksum(good));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_load_after_missing_file_rereads_content() {
        let (_dir, store) = store_with("server:\n  port: 1111\n");
        store.load().unwrap();
        let content = fs::read_to_string(store.path()).unwrap();
        fs::remove_file(store.path()).unwrap();
        assert!(matches!(store.load().unwrap_err(), ConfigError::Io { .. }));

        write_config(store.path(), &content);
        assert!(store.load().unwrap().is_some());
    }

    #[test]
    fn test_failed_write_with_lock_without_base_records_nothing() {
        let (_dir, store) = store_with("server:\n  port: 1111\n");
        let err = store.write_with_lock(&SetServerPort(0), None).unwrap_err();
        assert!(matches!(err, ConfigError::Rejected(_)));

        let cmd = ExpectChecksum::new(SetServerPort(2222), "stale");
        let err = store.write_with_lock(&cmd, None).unwrap_err();
        assert!(matches!(err, ConfigError::Conflict { .. }));

        let snap = store.load().unwrap().unwrap();
        assert_eq!(snap.editable().server.port, 1111);
    }

    #[test]
    fn test_unchanged_write_with_lock_without_base_records_checksum() {
        let (_dir, store) = store_with("server:\n  port: 1111\n");
        let result = store.write_with_lock(&SetServerPort(1111), None).unwrap();
        assert_eq!(result.state, SaveState::Unchanged);
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_location_is_absolute() {
        let (_dir, store) = store_with("");
        assert!(store.location().is_absolute());
        assert!(store.location().ends_with("config.yaml"));
    }
}
