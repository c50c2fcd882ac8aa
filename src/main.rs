use anyhow::Result;
use clap::{Parser, Subcommand};
use confcache_config::{Config, FileConfigStore, SetServerPort};
use confcache_core::{ConfigCache, ConfigWatcher, ReloadScheduler, ServerHealthService};
use confcache_types::{ChangeListener, ConfigValidity};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt as _, util::SubscriberInitExt as _};

#[derive(Parser, Debug)]
#[command(name = "confcache", about = "confcache: last-known-good configuration cache")]
struct Cli {
    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load the configuration and keep it fresh until interrupted.
    Serve {
        /// Path to the YAML configuration file.
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
        /// Seconds between scheduled reloads (default: 60).
        #[arg(short, long, default_value_t = 60)]
        interval: u64,
        /// Also reload as soon as the file changes on disk.
        #[arg(long)]
        watch: bool,
    },
    /// Validate the configuration file and exit.
    Check {
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
    },
    /// Print the configuration as JSON.
    Show {
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
        /// Print the editable view instead of the runtime view.
        #[arg(long)]
        editable: bool,
    },
    /// Change the server port through a locked write.
    SetPort {
        #[arg(short, long, value_name = "FILE")]
        config: PathBuf,
        port: u16,
    },
}

/// Logs a summary of every configuration the cache installs.
struct LoggingListener;

impl ChangeListener<Config> for LoggingListener {
    fn on_config_change(&self, config: &Arc<Config>) -> confcache_types::Result<()> {
        tracing::info!(
            host = %config.server.host,
            port = config.server.port,
            pipelines = config.pipelines.len(),
            "configuration applied"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match cli.command {
        Commands::Serve {
            config,
            interval,
            watch,
        } => cmd_serve(config, interval, watch).await,
        Commands::Check { config } => cmd_check(config),
        Commands::Show { config, editable } => cmd_show(config, editable),
        Commands::SetPort { config, port } => cmd_set_port(config, port),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "confcache=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn open_cache(path: PathBuf) -> Arc<ConfigCache<FileConfigStore>> {
    Arc::new(ConfigCache::new(
        FileConfigStore::new(path),
        Arc::new(ServerHealthService::new()),
    ))
}

async fn cmd_serve(config_path: PathBuf, interval: u64, watch_file: bool) -> Result<()> {
    let cache = open_cache(config_path);
    cache.register_listener(Arc::new(LoggingListener));
    cache.ensure_loaded();
    if let ConfigValidity::Invalid(msg) = cache.check_validity() {
        tracing::warn!(error = %msg, "starting with an invalid configuration file");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = ReloadScheduler::new(Duration::from_secs(interval))
        .spawn(Arc::clone(&cache), shutdown_rx);
    let _watcher = if watch_file {
        Some(ConfigWatcher::new(Arc::clone(&cache)).watch()?)
    } else {
        None
    };

    tracing::info!(
        location = %cache.file_location().display(),
        "confcache serving configuration"
    );
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    let _ = shutdown_tx.send(true);
    scheduler.await?;
    Ok(())
}

fn cmd_check(config_path: PathBuf) -> Result<()> {
    let cache = open_cache(config_path);
    cache.reload();
    match cache.check_validity() {
        ConfigValidity::Valid => {
            println!("{}: valid", cache.file_location().display());
            Ok(())
        }
        ConfigValidity::Invalid(msg) => {
            anyhow::bail!("{}: invalid: {msg}", cache.file_location().display())
        }
    }
}

fn cmd_show(config_path: PathBuf, editable: bool) -> Result<()> {
    let cache = open_cache(config_path);
    let config = if editable {
        cache.for_editing()?
    } else {
        cache.reload();
        if let ConfigValidity::Invalid(msg) = cache.check_validity() {
            anyhow::bail!("config error: {msg}");
        }
        cache.current()
    };
    println!("{}", serde_json::to_string_pretty(&*config)?);
    Ok(())
}

fn cmd_set_port(config_path: PathBuf, port: u16) -> Result<()> {
    let cache = open_cache(config_path);
    let state = cache.write_with_lock(&SetServerPort(port))?;
    println!("port {port}: {state}");
    Ok(())
}
