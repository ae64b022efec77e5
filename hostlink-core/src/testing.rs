use crate::command::CommandRunner;
use std::sync::Mutex;

/// Replays canned results keyed by exact command line and records every call.
/// Commands without a script entry fail like a missing binary.
#[derive(Default)]
pub struct ScriptedRunner {
  script: Vec<(String, Result<String, String>)>,
  calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn ok(mut self, cmd: &str, stdout: &str) -> Self {
    self.script.push((cmd.to_string(), Ok(stdout.to_string())));
    self
  }

  pub fn fail(mut self, cmd: &str) -> Self {
    self
      .script
      .push((cmd.to_string(), Err("exit status: 1".to_string())));
    self
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }
}

impl CommandRunner for ScriptedRunner {
  fn run(&self, cmd: &str) -> anyhow::Result<String> {
    self.calls.lock().unwrap().push(cmd.to_string());
    match self.script.iter().find(|(c, _)| c == cmd) {
      Some((_, Ok(out))) => Ok(out.clone()),
      Some((_, Err(e))) => Err(anyhow::anyhow!("`{cmd}`: {e}")),
      None => Err(anyhow::anyhow!("sh: 1: {cmd}: not found")),
    }
  }
}
