use anyhow::Context;
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Runs a shell command line and hands back its stdout.
///
/// A non-zero exit, a spawn failure or a timeout is an `Err`; callers doing
/// capability detection treat any `Err` as "not present".
pub trait CommandRunner: Send + Sync {
  fn run(&self, cmd: &str) -> anyhow::Result<String>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for Arc<T> {
  fn run(&self, cmd: &str) -> anyhow::Result<String> {
    (**self).run(cmd)
  }
}

/// `sh -c <cmd>` in its own process group. The deadline covers the whole
/// run, including stdout reaching EOF.
#[derive(Debug, Clone)]
pub struct ShellRunner {
  timeout: Duration,
}

impl ShellRunner {
  pub fn new(timeout: Duration) -> Self {
    Self { timeout }
  }

  pub fn timeout(&self) -> Duration {
    self.timeout
  }
}

impl Default for ShellRunner {
  fn default() -> Self {
    Self::new(DEFAULT_PROBE_TIMEOUT)
  }
}

impl CommandRunner for ShellRunner {
  fn run(&self, cmd: &str) -> anyhow::Result<String> {
    let deadline = Instant::now() + self.timeout;

    let mut command = Command::new("sh");
    command
      .args(["-c", cmd])
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::null());
    #[cfg(unix)]
    {
      use std::os::unix::process::CommandExt;
      command.process_group(0);
    }

    let mut child = command
      .spawn()
      .with_context(|| format!("spawn `{cmd}`"))?;

    let mut stdout = child
      .stdout
      .take()
      .ok_or_else(|| anyhow::anyhow!("stdout not captured for `{cmd}`"))?;
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
      let mut buf = Vec::new();
      let _ = stdout.read_to_end(&mut buf);
      let _ = tx.send(buf);
    });

    let status = loop {
      if let Some(status) = child.try_wait().with_context(|| format!("wait `{cmd}`"))? {
        break status;
      }
      if Instant::now() >= deadline {
        kill_group(&mut child);
        anyhow::bail!(
          "`{cmd}` timed out after {}ms",
          self.timeout.as_millis()
        );
      }
      thread::sleep(POLL_INTERVAL);
    };

    // `sh` is gone but a background member of the group may still hold the pipe.
    let out = match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
      Ok(buf) => buf,
      Err(_) => {
        kill_group(&mut child);
        anyhow::bail!(
          "`{cmd}` kept stdout open past {}ms",
          self.timeout.as_millis()
        );
      }
    };

    if !status.success() {
      anyhow::bail!("`{cmd}` exited with {status}");
    }

    Ok(String::from_utf8_lossy(&out).into_owned())
  }
}

fn kill_group(child: &mut Child) {
  #[cfg(unix)]
  {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    // The group id is the pid of `sh`, which led the group at spawn.
    let _ = killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL);
  }
  let _ = child.kill();
  let _ = child.wait();
}
