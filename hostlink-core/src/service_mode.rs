use crate::command::CommandRunner;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const SYSTEMCTL_PROBE: &str = "which systemctl";
pub const SERVICE_PROBE: &str = "which service";

/// Facility used to start, stop and enable the managed service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceControlMode {
  Systemctl,
  Service,
  Universal,
  Docker,
}

impl ServiceControlMode {
  /// Maps an explicit configuration token. Matching is exact and
  /// case-sensitive; `common` is an alias of `universal`.
  pub fn from_token(token: &str) -> Option<Self> {
    match token {
      "systemctl" => Some(Self::Systemctl),
      "service" => Some(Self::Service),
      "universal" | "common" => Some(Self::Universal),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Systemctl => "systemctl",
      Self::Service => "service",
      Self::Universal => "universal",
      Self::Docker => "docker",
    }
  }
}

impl fmt::Display for ServiceControlMode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Picks the service control mode: an explicit token wins, otherwise probe
/// for `systemctl`, then `service`, then settle on `Universal`.
///
/// Never fails. A probe that errors or prints nothing useful only means the
/// tool is absent.
pub fn resolve(explicit: &str, runner: &dyn CommandRunner) -> ServiceControlMode {
  if let Some(mode) = ServiceControlMode::from_token(explicit) {
    tracing::debug!(mode = %mode, "service control mode set explicitly");
    return mode;
  }

  if !explicit.is_empty() {
    tracing::warn!(
      token = explicit,
      "unrecognized service control mode; probing instead"
    );
  }

  if probe_reports(runner, SYSTEMCTL_PROBE, "systemctl") {
    tracing::debug!("systemctl found; using systemctl mode");
    return ServiceControlMode::Systemctl;
  }

  if probe_reports(runner, SERVICE_PROBE, "service") {
    tracing::debug!("service found; using service mode");
    return ServiceControlMode::Service;
  }

  tracing::debug!("no service manager found; using universal mode");
  ServiceControlMode::Universal
}

fn probe_reports(runner: &dyn CommandRunner, cmd: &str, needle: &str) -> bool {
  match runner.run(cmd) {
    Ok(out) => out.contains(needle),
    Err(e) => {
      tracing::trace!(probe = cmd, error = %e, "probe reported absent");
      false
    }
  }
}
