pub mod command;
pub mod config;
pub mod console;
pub mod containment;
pub mod environment;
pub mod error;
pub mod logging;
pub mod paths;
pub mod proxy_client;
pub mod selector;
pub mod service_mode;
pub mod settings;
pub mod state;

#[cfg(test)]
mod testing;

pub use command::{CommandRunner, ShellRunner};
pub use containment::{resolve_gateway_host, ContainmentProbe, RouteProbeKind};
pub use environment::Environment;
pub use error::{ClientError, ClientResult};
pub use proxy_client::{ClientRoute, DialerFactory, ProxyClientFactory, SelectedClient};
pub use selector::AutomaticClientSelector;
pub use service_mode::ServiceControlMode;
pub use settings::{ConnectionState, ProxyMode, ServerRef, Setting, SettingsStore, TransparentMode};

pub fn run_console(args: &[String]) -> anyhow::Result<()> {
  let readonly = args.iter().any(|a| a == "--readonly");
  let cmd = console::ConsoleCommand::from_args(args)?;

  let base = paths::base_dir();
  let env = Environment::load(&base, readonly)?;

  if readonly {
    logging::init_stderr(&env.config.logging.level)?;
  } else {
    logging::init_file_and_stderr(
      &paths::logs_dir(&base),
      &env.config.logging.level,
      env.config.logging.retention_days,
    )?;
  }

  tracing::debug!(command = ?cmd, base = %base.display(), "hostlink console");
  console::run(&env, &cmd)
}
