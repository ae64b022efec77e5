use std::path::{Path, PathBuf};

pub const HOME_ENV: &str = "HOSTLINK_HOME";

const DEFAULT_BASE_DIR: &str = "/etc/hostlink";

pub fn base_dir() -> PathBuf {
  match std::env::var_os(HOME_ENV) {
    Some(dir) if !dir.is_empty() => PathBuf::from(dir),
    _ => PathBuf::from(DEFAULT_BASE_DIR),
  }
}

pub fn config_path(base: &Path) -> PathBuf {
  base.join("config.toml")
}

pub fn logs_dir(base: &Path) -> PathBuf {
  base.join("logs")
}

/// Snapshot file named in config; absolute names are used as-is.
pub fn snapshot_path(base: &Path, name: &str) -> PathBuf {
  base.join(name)
}
