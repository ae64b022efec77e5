use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransparentMode {
  #[default]
  Close,
  Proxy,
  Whitelist,
  Gfwlist,
  Pac,
}

/// How subscription and other outbound requests of the agent itself travel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyMode {
  #[default]
  Direct,
  Pac,
  Proxy,
}

/// Application settings as persisted by their owner. Read-only here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
  #[serde(default)]
  pub transparent: TransparentMode,

  #[serde(default)]
  pub proxy_mode_when_subscribe: ProxyMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRef {
  pub id: String,

  #[serde(default)]
  pub name: Option<String>,
}

pub trait SettingsStore: Send + Sync {
  /// Current settings; defaults when nothing is stored.
  fn current_settings(&self) -> Setting;
}

pub trait ConnectionState: Send + Sync {
  fn is_managed_process_running(&self) -> bool;
  fn connected_server(&self) -> Option<ServerRef>;
}
