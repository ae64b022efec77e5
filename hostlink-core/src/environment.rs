use crate::command::{CommandRunner, ShellRunner};
use crate::config::{self, Config};
use crate::containment::{resolve_gateway_host, ContainmentProbe, RouteProbeKind, SystemContainment};
use crate::paths;
use crate::proxy_client::ProxyClientFactory;
use crate::selector::AutomaticClientSelector;
use crate::service_mode::{self, ServiceControlMode};
use crate::state::HostState;
use std::path::Path;
use std::sync::Arc;

/// Production wiring of every collaborator the resolvers need.
pub struct Environment {
  pub config: Config,
  pub runner: Arc<dyn CommandRunner>,
  pub containment: Box<dyn ContainmentProbe>,
  pub state: HostState,
  pub factory: ProxyClientFactory,
}

impl Environment {
  /// Loads `<base>/config.toml` (creating it unless `readonly`) and applies
  /// the service mode environment override.
  pub fn load(base: &Path, readonly: bool) -> anyhow::Result<Self> {
    let config_path = paths::config_path(base);
    let mut cfg = if readonly {
      config::load_or_default_readonly(&config_path)?
    } else {
      config::load_or_create_default(&config_path)?
    };
    config::apply_service_mode_override(&mut cfg, config::service_mode_from_env());
    Ok(Self::from_config(base, cfg))
  }

  pub fn from_config(base: &Path, config: Config) -> Self {
    let runner = Arc::new(ShellRunner::new(config.probe_timeout()));
    Self::from_parts(base, config, runner, Box::new(SystemContainment::new()))
  }

  /// Same wiring with the shell and container detection supplied by the
  /// caller. The state reader shares `runner`.
  pub fn from_parts(
    base: &Path,
    config: Config,
    runner: Arc<dyn CommandRunner>,
    containment: Box<dyn ContainmentProbe>,
  ) -> Self {
    let state = HostState::new(
      Box::new(runner.clone()),
      config.state.process_name.clone(),
      paths::snapshot_path(base, &config.state.snapshot),
    );
    Self {
      config,
      runner,
      containment,
      state,
      factory: ProxyClientFactory::new(),
    }
  }

  pub fn service_mode(&self) -> ServiceControlMode {
    service_mode::resolve(&self.config.environment.service_mode, &*self.runner)
  }

  pub fn in_container(&self) -> bool {
    self.containment.is_in_container()
  }

  pub fn gateway_host(&self, kind: RouteProbeKind) -> String {
    resolve_gateway_host(self.in_container(), kind, &*self.runner)
  }

  pub fn selector(&self) -> AutomaticClientSelector<'_> {
    self.selector_with(&self.factory)
  }

  /// Selector over this environment's live state that builds clients with
  /// `factory`, e.g. one carrying a request timeout.
  pub fn selector_with<'a>(&'a self, factory: &'a ProxyClientFactory) -> AutomaticClientSelector<'a> {
    AutomaticClientSelector::new(
      &*self.runner,
      &*self.containment,
      &self.state,
      &self.state,
      factory,
    )
  }
}
