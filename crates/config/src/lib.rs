//! Reference configuration schema and YAML file store for confcache.
//!
//! Uses figment to merge defaults, the YAML file and `CONFCACHE_*`
//! environment overrides, and sha2 checksums to skip reparsing an
//! unchanged file.

pub mod command;
pub mod schema;
pub mod store;

pub use command::{AddPipeline, ExpectChecksum, FnCommand, RemovePipeline, SetServerPort};
pub use schema::{CURRENT_SCHEMA_VERSION, Config, ENV_PREFIX, PipelineConfig, ServerConfig};
pub use store::{FileConfigStore, checksum};
