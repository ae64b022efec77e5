use crate::command::CommandRunner;
use crate::settings::{ConnectionState, ServerRef, Setting, SettingsStore};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk view of the owning application's state. Written elsewhere; this
/// crate only reads it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
  #[serde(default)]
  pub setting: Setting,

  #[serde(default)]
  pub connected: Option<ServerRef>,
}

pub fn load_snapshot(path: &Path) -> StateSnapshot {
  let raw = match fs::read_to_string(path) {
    Ok(r) => r,
    Err(e) => {
      tracing::debug!(path = %path.display(), error = %e, "state snapshot unavailable; using defaults");
      return StateSnapshot::default();
    }
  };

  match toml::from_str::<StateSnapshot>(&raw) {
    Ok(s) => s,
    Err(e) => {
      tracing::warn!(path = %path.display(), error = %e, "state snapshot unreadable; using defaults");
      StateSnapshot::default()
    }
  }
}

/// Live state of the host: settings and connected server from the snapshot
/// file, process liveness from `pgrep`. Nothing is cached between calls.
pub struct HostState {
  runner: Box<dyn CommandRunner>,
  process_name: String,
  snapshot_path: PathBuf,
}

impl HostState {
  pub fn new(
    runner: Box<dyn CommandRunner>,
    process_name: impl Into<String>,
    snapshot_path: impl Into<PathBuf>,
  ) -> Self {
    Self {
      runner,
      process_name: process_name.into(),
      snapshot_path: snapshot_path.into(),
    }
  }

  pub fn snapshot(&self) -> StateSnapshot {
    load_snapshot(&self.snapshot_path)
  }
}

impl SettingsStore for HostState {
  fn current_settings(&self) -> Setting {
    self.snapshot().setting
  }
}

impl ConnectionState for HostState {
  fn is_managed_process_running(&self) -> bool {
    if !is_safe_process_name(&self.process_name) {
      tracing::warn!(
        process_name = %self.process_name,
        "refusing to probe for a process name with shell metacharacters"
      );
      return false;
    }

    match self.runner.run(&format!("pgrep -x {}", self.process_name)) {
      Ok(out) => !out.trim().is_empty(),
      Err(_) => false,
    }
  }

  fn connected_server(&self) -> Option<ServerRef> {
    self.snapshot().connected
  }
}

fn is_safe_process_name(name: &str) -> bool {
  !name.is_empty()
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
