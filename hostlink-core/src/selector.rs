use crate::command::CommandRunner;
use crate::containment::{resolve_gateway_host, ContainmentProbe, RouteProbeKind};
use crate::error::ClientResult;
use crate::proxy_client::{ClientRoute, ProxyClientFactory, SelectedClient};
use crate::settings::{ConnectionState, ProxyMode, SettingsStore, TransparentMode};

pub const SOCKS5_PROXY_PORT: u16 = 20170;
pub const HTTP_PROXY_PORT: u16 = 20172;

/// Inbound ports the managed proxy process listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyPorts {
  pub socks5: u16,
  pub http: u16,
}

impl Default for ProxyPorts {
  fn default() -> Self {
    Self {
      socks5: SOCKS5_PROXY_PORT,
      http: HTTP_PROXY_PORT,
    }
  }
}

/// Chooses how the agent's own HTTP requests leave the host, from live state
/// read on every call.
pub struct AutomaticClientSelector<'a> {
  runner: &'a dyn CommandRunner,
  containment: &'a dyn ContainmentProbe,
  settings: &'a dyn SettingsStore,
  state: &'a dyn ConnectionState,
  factory: &'a ProxyClientFactory,
  ports: ProxyPorts,
}

impl<'a> AutomaticClientSelector<'a> {
  pub fn new(
    runner: &'a dyn CommandRunner,
    containment: &'a dyn ContainmentProbe,
    settings: &'a dyn SettingsStore,
    state: &'a dyn ConnectionState,
    factory: &'a ProxyClientFactory,
  ) -> Self {
    Self {
      runner,
      containment,
      settings,
      state,
      factory,
      ports: ProxyPorts::default(),
    }
  }

  pub fn with_ports(mut self, ports: ProxyPorts) -> Self {
    self.ports = ports;
    self
  }

  /// Route the next client should take.
  ///
  /// Direct whenever the proxy process is down, no server is connected, or
  /// transparent mode is anything but `Close`. The last clause keeps the
  /// condition exactly as the settings owner has always evaluated it.
  pub fn route(&self) -> ClientRoute {
    let setting = self.settings.current_settings();

    if !self.state.is_managed_process_running()
      || self.state.connected_server().is_none()
      || setting.transparent != TransparentMode::Close
    {
      tracing::debug!(transparent = ?setting.transparent, "using direct client");
      return ClientRoute::Direct;
    }

    match setting.proxy_mode_when_subscribe {
      ProxyMode::Pac => self.http_route(),
      ProxyMode::Proxy => self.socks5_route(),
      ProxyMode::Direct => ClientRoute::Direct,
    }
  }

  pub fn select(&self) -> ClientResult<SelectedClient> {
    let route = self.route();
    tracing::info!(route = ?route, "selected outbound client");
    self.client_for(route)
  }

  /// SOCKS5 client to the managed process, regardless of settings.
  pub fn socks5_client(&self) -> ClientResult<SelectedClient> {
    self.client_for(self.socks5_route())
  }

  /// HTTP proxy client to the managed process, regardless of settings.
  pub fn http_client(&self) -> ClientResult<SelectedClient> {
    self.client_for(self.http_route())
  }

  fn socks5_route(&self) -> ClientRoute {
    let host = self.gateway_host(RouteProbeKind::DefaultRouteHead);
    ClientRoute::Proxied {
      url: format!("socks5://{host}:{}", self.ports.socks5),
    }
  }

  fn http_route(&self) -> ClientRoute {
    let host = self.gateway_host(RouteProbeKind::DefaultRouteGrep);
    ClientRoute::Proxied {
      url: format!("http://{host}:{}", self.ports.http),
    }
  }

  fn gateway_host(&self, kind: RouteProbeKind) -> String {
    resolve_gateway_host(self.containment.is_in_container(), kind, self.runner)
  }

  fn client_for(&self, route: ClientRoute) -> ClientResult<SelectedClient> {
    match route {
      ClientRoute::Direct => self.factory.direct(),
      ClientRoute::Proxied { url } => self.factory.build(&url),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::containment::FALLBACK_GATEWAY_HOST;
  use crate::error::ClientError;
  use crate::settings::{ServerRef, Setting};
  use crate::testing::ScriptedRunner;

  struct Fixture {
    running: bool,
    connected: bool,
    in_container: bool,
    setting: Setting,
  }

  impl Default for Fixture {
    fn default() -> Self {
      Self {
        running: true,
        connected: true,
        in_container: false,
        setting: Setting {
          transparent: TransparentMode::Close,
          proxy_mode_when_subscribe: ProxyMode::Proxy,
        },
      }
    }
  }

  impl SettingsStore for Fixture {
    fn current_settings(&self) -> Setting {
      self.setting.clone()
    }
  }

  impl ConnectionState for Fixture {
    fn is_managed_process_running(&self) -> bool {
      self.running
    }

    fn connected_server(&self) -> Option<ServerRef> {
      self.connected.then(|| ServerRef {
        id: "1".to_string(),
        name: None,
      })
    }
  }

  impl ContainmentProbe for Fixture {
    fn is_in_container(&self) -> bool {
      self.in_container
    }
  }

  fn route(fx: &Fixture, runner: &ScriptedRunner) -> ClientRoute {
    let factory = ProxyClientFactory::new();
    AutomaticClientSelector::new(runner, fx, fx, fx, &factory).route()
  }

  fn proxied(url: &str) -> ClientRoute {
    ClientRoute::Proxied {
      url: url.to_string(),
    }
  }

  fn gateway_runner() -> ScriptedRunner {
    ScriptedRunner::new()
      .ok(RouteProbeKind::DefaultRouteHead.command(), "  10.0.0.1  \n")
      .ok(RouteProbeKind::DefaultRouteGrep.command(), "172.17.0.1\n")
  }

  #[test]
  fn direct_whenever_process_is_down() {
    for mode in [ProxyMode::Direct, ProxyMode::Pac, ProxyMode::Proxy] {
      for transparent in [TransparentMode::Close, TransparentMode::Proxy, TransparentMode::Pac] {
        let fx = Fixture {
          running: false,
          in_container: true,
          setting: Setting {
            transparent,
            proxy_mode_when_subscribe: mode,
          },
          ..Fixture::default()
        };
        let runner = gateway_runner();
        assert_eq!(route(&fx, &runner), ClientRoute::Direct);
        assert!(runner.calls().is_empty());
      }
    }
  }

  #[test]
  fn direct_without_connected_server() {
    let fx = Fixture {
      connected: false,
      ..Fixture::default()
    };
    assert_eq!(route(&fx, &gateway_runner()), ClientRoute::Direct);
  }

  #[test]
  fn direct_when_transparent_mode_is_active() {
    for transparent in [
      TransparentMode::Proxy,
      TransparentMode::Whitelist,
      TransparentMode::Gfwlist,
      TransparentMode::Pac,
    ] {
      let mut fx = Fixture::default();
      fx.setting.transparent = transparent;
      assert_eq!(route(&fx, &gateway_runner()), ClientRoute::Direct);
    }
  }

  #[test]
  fn proxy_mode_uses_socks5_on_loopback() {
    let runner = gateway_runner();
    assert_eq!(
      route(&Fixture::default(), &runner),
      proxied("socks5://127.0.0.1:20170")
    );
    assert!(runner.calls().is_empty());
  }

  #[test]
  fn proxy_mode_in_container_uses_head_probe_gateway() {
    let fx = Fixture {
      in_container: true,
      ..Fixture::default()
    };
    let runner = gateway_runner();
    assert_eq!(route(&fx, &runner), proxied("socks5://10.0.0.1:20170"));
    assert_eq!(runner.calls(), vec![RouteProbeKind::DefaultRouteHead.command()]);
  }

  #[test]
  fn pac_mode_in_container_uses_grep_probe_gateway() {
    let mut fx = Fixture {
      in_container: true,
      ..Fixture::default()
    };
    fx.setting.proxy_mode_when_subscribe = ProxyMode::Pac;
    let runner = gateway_runner();
    assert_eq!(route(&fx, &runner), proxied("http://172.17.0.1:20172"));
    assert_eq!(runner.calls(), vec![RouteProbeKind::DefaultRouteGrep.command()]);
  }

  #[test]
  fn failed_route_probe_targets_sibling_container() {
    let fx = Fixture {
      in_container: true,
      ..Fixture::default()
    };
    let runner = ScriptedRunner::new();
    assert_eq!(
      route(&fx, &runner),
      proxied(&format!("socks5://{FALLBACK_GATEWAY_HOST}:20170"))
    );
  }

  #[test]
  fn direct_subscription_mode_stays_direct() {
    let mut fx = Fixture::default();
    fx.setting.proxy_mode_when_subscribe = ProxyMode::Direct;
    assert_eq!(route(&fx, &gateway_runner()), ClientRoute::Direct);
  }

  #[test]
  fn ports_can_be_overridden() {
    let fx = Fixture::default();
    let runner = ScriptedRunner::new();
    let factory = ProxyClientFactory::new();
    let selector = AutomaticClientSelector::new(&runner, &fx, &fx, &fx, &factory).with_ports(
      ProxyPorts {
        socks5: 1080,
        http: 8080,
      },
    );
    assert_eq!(selector.route(), proxied("socks5://127.0.0.1:1080"));
  }

  #[test]
  fn select_builds_the_routed_client() {
    let fx = Fixture::default();
    let runner = ScriptedRunner::new();
    let factory = ProxyClientFactory::new();
    let selector = AutomaticClientSelector::new(&runner, &fx, &fx, &fx, &factory);

    let selected = selector.select().unwrap();
    assert_eq!(selected.route, proxied("socks5://127.0.0.1:20170"));

    let http = selector.http_client().unwrap();
    assert_eq!(http.route, proxied("http://127.0.0.1:20172"));
  }

  #[test]
  fn factory_errors_propagate() {
    let fx = Fixture {
      in_container: true,
      ..Fixture::default()
    };
    let runner = ScriptedRunner::new()
      .ok(RouteProbeKind::DefaultRouteHead.command(), "bad host\n");
    let factory = ProxyClientFactory::new();
    let selector = AutomaticClientSelector::new(&runner, &fx, &fx, &fx, &factory);

    let err = selector.select().unwrap_err();
    assert!(matches!(err, ClientError::InvalidUrl { .. }), "{err}");
  }
}
