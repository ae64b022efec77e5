use crate::command::DEFAULT_PROBE_TIMEOUT;
use crate::service_mode::ServiceControlMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const SERVICE_MODE_ENV: &str = "HOSTLINK_SERVICE_MODE";

#[derive(Debug, Clone, Default)]
pub struct Config {
  pub environment: EnvironmentConfig,
  pub probe: ProbeConfig,
  pub state: StateConfig,
  pub logging: LoggingConfig,
}

impl Config {
  pub fn probe_timeout(&self) -> Duration {
    Duration::from_millis(self.probe.timeout_ms)
  }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentConfig {
  /// `systemctl`, `service`, `universal` or `common`; anything else probes.
  #[serde(default)]
  pub service_mode: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
  #[serde(default = "default_probe_timeout_ms")]
  pub timeout_ms: u64,
}

impl Default for ProbeConfig {
  fn default() -> Self {
    Self {
      timeout_ms: default_probe_timeout_ms(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
  #[serde(default = "default_process_name")]
  pub process_name: String,

  /// File name of the state snapshot, relative to the base directory.
  #[serde(default = "default_snapshot")]
  pub snapshot: String,
}

impl Default for StateConfig {
  fn default() -> Self {
    Self {
      process_name: default_process_name(),
      snapshot: default_snapshot(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
  #[serde(default = "default_log_level")]
  pub level: String,

  #[serde(default = "default_retention_days")]
  pub retention_days: u64,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: default_log_level(),
      retention_days: default_retention_days(),
    }
  }
}

fn default_probe_timeout_ms() -> u64 {
  DEFAULT_PROBE_TIMEOUT.as_millis() as u64
}

fn default_process_name() -> String {
  "v2ray".to_string()
}

fn default_snapshot() -> String {
  "state.toml".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_retention_days() -> u64 {
  14
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
  #[serde(default)]
  pub environment: Option<EnvironmentConfig>,

  #[serde(default)]
  pub probe: Option<ProbeConfig>,

  #[serde(default)]
  pub state: Option<StateConfig>,

  #[serde(default)]
  pub logging: Option<LoggingConfig>,

  // Back-compat: early configs had a top-level `mode = "..."`.
  #[serde(default)]
  pub mode: Option<String>,
}

impl ConfigFile {
  fn normalize(self) -> Config {
    let mut cfg = Config::default();
    if let Some(env) = self.environment {
      cfg.environment = env;
    } else if let Some(legacy) = self.mode {
      cfg.environment.service_mode = legacy;
    }
    if let Some(p) = self.probe {
      cfg.probe = p;
    }
    if let Some(s) = self.state {
      cfg.state = s;
    }
    if let Some(l) = self.logging {
      cfg.logging = l;
    }

    if cfg.probe.timeout_ms == 0 {
      tracing::warn!(
        default_ms = default_probe_timeout_ms(),
        "probe.timeout_ms must be > 0; using default"
      );
      cfg.probe.timeout_ms = default_probe_timeout_ms();
    }
    if cfg.state.snapshot.trim().is_empty() {
      cfg.state.snapshot = default_snapshot();
    }
    warn_unknown_service_mode(&cfg.environment.service_mode);

    cfg
  }

  fn needs_upgrade(&self) -> bool {
    self.environment.is_none() || self.probe.is_none() || self.state.is_none() || self.logging.is_none()
  }
}

fn warn_unknown_service_mode(token: &str) {
  if !token.is_empty() && ServiceControlMode::from_token(token).is_none() {
    tracing::warn!(
      service_mode = token,
      "unknown environment.service_mode; service manager will be probed"
    );
  }
}

/// Replaces the configured service mode with `value` when it is set.
pub fn apply_service_mode_override(cfg: &mut Config, value: Option<String>) {
  if let Some(v) = value {
    warn_unknown_service_mode(&v);
    cfg.environment.service_mode = v;
  }
}

pub fn service_mode_from_env() -> Option<String> {
  std::env::var(SERVICE_MODE_ENV).ok()
}

pub fn load_or_create_default(path: &Path) -> anyhow::Result<Config> {
  load_impl(path, true)
}

pub fn load_or_default_readonly(path: &Path) -> anyhow::Result<Config> {
  load_impl(path, false)
}

fn load_impl(path: &Path, allow_writes: bool) -> anyhow::Result<Config> {
  let parent = path
    .parent()
    .ok_or_else(|| anyhow::anyhow!("config path has no parent: {}", path.display()))?;
  if allow_writes {
    fs::create_dir_all(parent)?;
  }

  if !path.exists() {
    let cfg = Config::default();
    if allow_writes {
      write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?)?;
    }
    return Ok(cfg);
  }

  let raw = fs::read_to_string(path)?;
  match toml::from_str::<ConfigFile>(&raw) {
    Ok(file) => {
      let upgrade = file.needs_upgrade();
      let cfg = file.normalize();
      if allow_writes && upgrade {
        let backup = parent.join(format!("config.toml.bak-{}", unix_secs()));
        let _ = fs::copy(path, &backup);
        let _ = write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?);
        eprintln!(
          "hostlink: upgraded config defaults written to {} (backup: {})",
          path.display(),
          backup.display()
        );
      }
      Ok(cfg)
    }
    Err(e) => {
      let cfg = Config::default();
      if allow_writes {
        let backup = parent.join(format!("config.toml.bad-{}", unix_secs()));
        let _ = fs::rename(path, &backup);
        write_atomic(path, &toml::to_string_pretty(&to_config_file(&cfg))?)?;
        eprintln!(
          "hostlink: invalid config at {} (backed up to {}): {e}",
          path.display(),
          backup.display()
        );
      } else {
        eprintln!(
          "hostlink: invalid config at {}; using defaults (read-only): {e}",
          path.display()
        );
      }
      Ok(cfg)
    }
  }
}

fn to_config_file(cfg: &Config) -> ConfigFile {
  ConfigFile {
    environment: Some(cfg.environment.clone()),
    probe: Some(cfg.probe.clone()),
    state: Some(cfg.state.clone()),
    logging: Some(cfg.logging.clone()),
    mode: None,
  }
}

fn unix_secs() -> u64 {
  std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs()
}

fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
  let parent = path
    .parent()
    .ok_or_else(|| anyhow::anyhow!("file path has no parent: {}", path.display()))?;
  let tmp = parent.join(format!(
    ".{}.tmp",
    path.file_name().unwrap_or_default().to_string_lossy()
  ));

  fs::write(&tmp, contents)?;
  fs::rename(&tmp, path)?;
  Ok(())
}
