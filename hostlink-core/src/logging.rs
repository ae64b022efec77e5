use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const LOG_FILE_NAME: &str = "hostlink.log";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Stderr plus a daily rolling file in `log_dir`.
pub fn init_file_and_stderr(
  log_dir: &Path,
  level: &str,
  retention_days: u64,
) -> anyhow::Result<()> {
  fs::create_dir_all(log_dir)?;
  cleanup_old_logs(log_dir, retention_days);

  let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
  let _ = FILE_GUARD.set(guard);

  let file_layer = tracing_subscriber::fmt::layer()
    .with_ansi(false)
    .with_writer(file_writer)
    .with_target(true);

  tracing_subscriber::registry()
    .with(env_filter(level))
    .with(file_layer)
    .with(stderr_layer())
    .try_init()?;
  Ok(())
}

/// Stderr only; used when nothing may be written to disk.
pub fn init_stderr(level: &str) -> anyhow::Result<()> {
  tracing_subscriber::registry()
    .with(env_filter(level))
    .with(stderr_layer())
    .try_init()?;
  Ok(())
}

fn env_filter(level: &str) -> tracing_subscriber::EnvFilter {
  tracing_subscriber::EnvFilter::try_new(level)
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
  S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
  tracing_subscriber::fmt::layer()
    .with_ansi(false)
    .with_writer(std::io::stderr)
    .with_target(true)
}

fn cleanup_old_logs(log_dir: &Path, retention_days: u64) {
  if retention_days == 0 {
    return;
  }

  let cutoff = SystemTime::now()
    .checked_sub(Duration::from_secs(retention_days.saturating_mul(24 * 60 * 60)))
    .unwrap_or(SystemTime::UNIX_EPOCH);

  let Ok(entries) = fs::read_dir(log_dir) else {
    return;
  };

  for entry in entries.flatten() {
    let path = entry.path();
    if !is_log_file(&path) {
      continue;
    }

    let modified = entry.metadata().and_then(|m| m.modified());
    if matches!(modified, Ok(t) if t < cutoff) {
      let _ = fs::remove_file(&path);
    }
  }
}

fn is_log_file(path: &Path) -> bool {
  match path.file_name().and_then(|n| n.to_str()) {
    Some(name) => name == LOG_FILE_NAME || name.starts_with("hostlink.log."),
    None => false,
  }
}
