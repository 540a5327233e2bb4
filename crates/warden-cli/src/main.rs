//! `warden`: compliance checks and remediation SQL for warehouse
//! configuration.
//!
//! Reads `warden.toml` (or the path given with `--config`), opens the SQLite
//! store, and runs one subcommand.
//!
//! # Usage
//!
//! ```
//! warden rules define MAX_AUTO_SUSPEND --kind warehouse --parameter auto_suspend --operator max
//! warden apply MAX_AUTO_SUSPEND 60
//! warden snapshots load warehouse warehouses.json
//! warden check
//! warden fixes --rule MAX_AUTO_SUSPEND
//! ```

mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::Parser;
use config::WardenConfig;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use warden_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Warehouse configuration compliance")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "warden.toml")]
  config: PathBuf,

  /// SQLite database file; overrides `store_path` from the config.
  #[arg(long, env = "WARDEN_STORE")]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Logs go to stderr so command output can be piped.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let mut cfg = WardenConfig::load(&cli.config)?;
  if let Some(path) = cli.store {
    cfg.store_path = path;
  }

  tracing::debug!(path = %cfg.store_path.display(), "opening store");
  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {}", cfg.store_path.display()))?;

  commands::run(cli.command, &store, store.registry(), &cfg).await
}
