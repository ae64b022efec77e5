use crate::containment::RouteProbeKind;
use crate::environment::Environment;
use crate::proxy_client::ClientRoute;
use crate::service_mode::ServiceControlMode;
use crate::settings::{ConnectionState, ServerRef, Setting};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
  Help,
  ServiceMode,
  Gateway(RouteProbeKind),
  Client,
  Report,
}

impl ConsoleCommand {
  pub fn from_args(args: &[String]) -> anyhow::Result<Self> {
    if args.iter().any(|a| a == "--help" || a == "-h") {
      return Ok(Self::Help);
    }

    if args.iter().any(|a| a == "--service-mode") {
      return Ok(Self::ServiceMode);
    }

    if let Some(i) = args.iter().position(|a| a == "--gateway") {
      let kind = match args.get(i + 1).map(|s| s.as_str()) {
        None | Some("head") => RouteProbeKind::DefaultRouteHead,
        Some("grep") => RouteProbeKind::DefaultRouteGrep,
        Some(other) if other.starts_with("--") => RouteProbeKind::DefaultRouteHead,
        Some(other) => {
          anyhow::bail!("unknown `--gateway` probe `{other}`; expected head|grep")
        }
      };
      return Ok(Self::Gateway(kind));
    }

    if args.iter().any(|a| a == "--client") {
      return Ok(Self::Client);
    }

    if args.iter().any(|a| a == "--report") {
      return Ok(Self::Report);
    }

    Ok(Self::Help)
  }
}

#[derive(Debug, Serialize)]
pub struct Report {
  pub service_mode: ServiceControlMode,
  pub in_container: bool,
  pub gateway_head: String,
  pub gateway_grep: String,
  pub process_running: bool,
  pub connected_server: Option<ServerRef>,
  pub setting: Setting,
  pub route: ClientRoute,
}

pub fn build_report(env: &Environment) -> Report {
  Report {
    service_mode: env.service_mode(),
    in_container: env.in_container(),
    gateway_head: env.gateway_host(RouteProbeKind::DefaultRouteHead),
    gateway_grep: env.gateway_host(RouteProbeKind::DefaultRouteGrep),
    process_running: env.state.is_managed_process_running(),
    connected_server: env.state.connected_server(),
    setting: env.state.snapshot().setting,
    route: env.selector().route(),
  }
}

pub fn run(env: &Environment, cmd: &ConsoleCommand) -> anyhow::Result<()> {
  match cmd {
    ConsoleCommand::Help => print_help(),
    ConsoleCommand::ServiceMode => println!("{}", env.service_mode()),
    ConsoleCommand::Gateway(kind) => {
      let in_container = env.in_container();
      println!("In container: {in_container}");
      println!("Gateway host: {}", env.gateway_host(*kind));
    }
    ConsoleCommand::Client => {
      let selected = env.selector().select()?;
      match selected.route {
        ClientRoute::Direct => println!("Outbound client: direct"),
        ClientRoute::Proxied { url } => println!("Outbound client: proxied via {url}"),
      }
    }
    ConsoleCommand::Report => {
      let report = build_report(env);
      println!("{}", serde_json::to_string_pretty(&report)?);
    }
  }
  Ok(())
}

fn print_help() {
  println!(
    "\
hostlink {}

Usage: hostlink [--readonly] <command>

Commands:
  --service-mode        print the service control mode in effect
  --gateway [head|grep] print the host the proxy ports are reached at
  --client              build the automatically selected outbound client
  --report              print everything above as JSON
  --version             print the version

Environment:
  HOSTLINK_HOME          base directory (default /etc/hostlink)
  HOSTLINK_SERVICE_MODE  overrides environment.service_mode",
    env!("CARGO_PKG_VERSION")
  );
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::containment::{SystemContainment, LOOPBACK_HOST};
  use crate::testing::ScriptedRunner;
  use std::sync::Arc;

  fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
  }

  #[test]
  fn parses_commands() {
    assert_eq!(
      ConsoleCommand::from_args(&args(&["hostlink", "--service-mode"])).unwrap(),
      ConsoleCommand::ServiceMode
    );
    assert_eq!(
      ConsoleCommand::from_args(&args(&["hostlink", "--readonly", "--client"])).unwrap(),
      ConsoleCommand::Client
    );
    assert_eq!(
      ConsoleCommand::from_args(&args(&["hostlink"])).unwrap(),
      ConsoleCommand::Help
    );
  }

  #[test]
  fn gateway_probe_kind_defaults_to_head() {
    assert_eq!(
      ConsoleCommand::from_args(&args(&["hostlink", "--gateway"])).unwrap(),
      ConsoleCommand::Gateway(RouteProbeKind::DefaultRouteHead)
    );
    assert_eq!(
      ConsoleCommand::from_args(&args(&["hostlink", "--gateway", "grep"])).unwrap(),
      ConsoleCommand::Gateway(RouteProbeKind::DefaultRouteGrep)
    );
    assert!(ConsoleCommand::from_args(&args(&["hostlink", "--gateway", "tail"])).is_err());
  }

  #[test]
  fn report_reflects_snapshot_and_explicit_mode() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
      dir.path().join("state.toml"),
      "[setting]\ntransparent = \"proxy\"\nproxy_mode_when_subscribe = \"proxy\"\n",
    )
    .unwrap();
    let root = tempfile::tempdir().unwrap();

    let mut cfg = crate::config::Config::default();
    cfg.environment.service_mode = "common".to_string();
    cfg.state.process_name = "v2ray".to_string();
    let runner = Arc::new(ScriptedRunner::new().fail("pgrep -x v2ray"));
    let env = Environment::from_parts(
      dir.path(),
      cfg,
      runner.clone(),
      Box::new(SystemContainment::with_root(root.path())),
    );

    let report = build_report(&env);
    assert_eq!(report.service_mode, ServiceControlMode::Universal);
    assert!(!report.in_container);
    assert_eq!(report.gateway_head, LOOPBACK_HOST);
    assert_eq!(report.gateway_grep, LOOPBACK_HOST);
    assert!(!report.process_running);
    assert!(report.connected_server.is_none());
    assert_eq!(report.route, ClientRoute::Direct);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["setting"]["transparent"], "proxy");
    assert_eq!(json["route"]["kind"], "direct");

    // Outside a container no route is read; only liveness hits the shell.
    assert!(runner.calls().iter().all(|c| c == "pgrep -x v2ray"), "{:?}", runner.calls());
  }

  #[test]
  fn report_in_container_reads_gateway_through_the_shell() {
    let dir = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join(".dockerenv"), "").unwrap();

    let runner = Arc::new(
      ScriptedRunner::new()
        .ok(RouteProbeKind::DefaultRouteHead.command(), "10.0.0.1\n")
        .ok(RouteProbeKind::DefaultRouteGrep.command(), "172.17.0.1\n")
        .ok("pgrep -x v2ray", "4242\n"),
    );
    let env = Environment::from_parts(
      dir.path(),
      crate::config::Config::default(),
      runner,
      Box::new(SystemContainment::with_root(root.path())),
    );

    let report = build_report(&env);
    assert!(report.in_container);
    assert_eq!(report.gateway_head, "10.0.0.1");
    assert_eq!(report.gateway_grep, "172.17.0.1");
    assert!(report.process_running);
  }
}
