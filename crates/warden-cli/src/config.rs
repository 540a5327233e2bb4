//! Runtime configuration: an optional TOML file layered under `WARDEN_*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct WardenConfig {
  /// SQLite database file. A leading `~/` is expanded.
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  /// Recorded as `applied_by` / `created_by` on writes.
  #[serde(default = "default_applied_by")]
  pub applied_by: String,
}

fn default_store_path() -> PathBuf { PathBuf::from("warden.db") }

fn default_applied_by() -> String {
  std::env::var("USER").unwrap_or_else(|_| "warden".to_owned())
}

impl WardenConfig {
  /// Read `path` if it exists, then apply `WARDEN_*` overrides.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path.to_path_buf()).required(false))
      .add_source(config::Environment::with_prefix("WARDEN"))
      .build()
      .context("failed to read config file")?;

    Self::from_settings(settings)
  }

  fn from_settings(settings: config::Config) -> anyhow::Result<Self> {
    let mut cfg: Self = settings
      .try_deserialize()
      .context("failed to deserialise WardenConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn from_toml(toml: &str) -> WardenConfig {
    let settings = config::Config::builder()
      .add_source(config::File::from_str(toml, config::FileFormat::Toml))
      .build()
      .unwrap();
    WardenConfig::from_settings(settings).unwrap()
  }

  #[test]
  fn defaults_apply_to_an_empty_file() {
    let cfg = from_toml("");
    assert_eq!(cfg.store_path, PathBuf::from("warden.db"));
    assert!(!cfg.applied_by.is_empty());
  }

  #[test]
  fn file_values_are_used() {
    let cfg = from_toml("store_path = \"/var/lib/warden/state.db\"\napplied_by = \"ops\"\n");
    assert_eq!(cfg.store_path, PathBuf::from("/var/lib/warden/state.db"));
    assert_eq!(cfg.applied_by, "ops");
  }

  #[test]
  fn missing_file_is_not_an_error() {
    let cfg = WardenConfig::load(Path::new("/nonexistent/warden.toml")).unwrap();
    assert!(!cfg.store_path.as_os_str().is_empty());
  }

  #[test]
  fn tilde_is_expanded() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/w.db")), PathBuf::from(home).join("w.db"));
    assert_eq!(expand_tilde(Path::new("/abs/w.db")), PathBuf::from("/abs/w.db"));
  }
}
