use crate::command::CommandRunner;
use std::fs;
use std::path::{Path, PathBuf};

pub const LOOPBACK_HOST: &str = "127.0.0.1";

/// Name a sibling proxy container answers to on the container network.
pub const FALLBACK_GATEWAY_HOST: &str = "v2ray";

const CGROUP_MARKERS: &[&str] = &["docker", "kubepods", "containerd", "libpod", "lxc"];

/// Two spellings of "third field of the default route line"; each proxied
/// client path has always used its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteProbeKind {
  DefaultRouteHead,
  DefaultRouteGrep,
}

impl RouteProbeKind {
  pub fn command(self) -> &'static str {
    match self {
      Self::DefaultRouteHead => "ip route list default|head -n 1|awk '{print $3}'",
      Self::DefaultRouteGrep => "ip route|grep default|awk '{print $3}'",
    }
  }
}

pub trait ContainmentProbe: Send + Sync {
  fn is_in_container(&self) -> bool;
}

/// Looks for container markers under a filesystem root (`/` in production).
#[derive(Debug, Clone)]
pub struct SystemContainment {
  root: PathBuf,
}

impl SystemContainment {
  pub fn new() -> Self {
    Self::with_root("/")
  }

  pub fn with_root(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }
}

impl Default for SystemContainment {
  fn default() -> Self {
    Self::new()
  }
}

impl ContainmentProbe for SystemContainment {
  fn is_in_container(&self) -> bool {
    detect_container(&self.root)
  }
}

fn detect_container(root: &Path) -> bool {
  if root.join(".dockerenv").exists() {
    return true;
  }

  if let Ok(cgroup) = fs::read_to_string(root.join("proc/1/cgroup")) {
    if CGROUP_MARKERS.iter().any(|m| cgroup.contains(m)) {
      return true;
    }
  }

  // NUL-separated; match on the key only.
  if let Ok(environ) = fs::read(root.join("proc/1/environ")) {
    if environ
      .split(|b| *b == 0)
      .any(|entry| entry.starts_with(b"container="))
    {
      return true;
    }
  }

  false
}

/// Address at which the proxy ports of the managed process are reachable.
///
/// Outside a container both processes share the loopback. Inside one, the
/// default gateway is the host; if the route table can't be read, fall back to
/// the sibling container's DNS name. Re-probed on every call since the
/// gateway may be reassigned.
pub fn resolve_gateway_host(
  in_container: bool,
  kind: RouteProbeKind,
  runner: &dyn CommandRunner,
) -> String {
  if !in_container {
    return LOOPBACK_HOST.to_string();
  }

  match runner.run(kind.command()) {
    Ok(out) => {
      let host = out.trim();
      if host.is_empty() {
        tracing::debug!(probe = ?kind, "default route probe printed nothing; using fallback host");
        return FALLBACK_GATEWAY_HOST.to_string();
      }
      tracing::debug!(probe = ?kind, host, "resolved gateway host");
      host.to_string()
    }
    Err(e) => {
      tracing::debug!(probe = ?kind, error = %e, "default route probe failed; using fallback host");
      FALLBACK_GATEWAY_HOST.to_string()
    }
  }
}
