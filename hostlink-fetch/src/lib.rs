use anyhow::Context;
use hostlink_core::{logging, paths, Environment, ProxyClientFactory};
use reqwest::blocking::Client;
use reqwest::Url;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_MAX_BYTES: usize = 8 * 1024 * 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct FetchOptions {
  pub url: Url,
  pub out: Option<PathBuf>,
  pub max_bytes: usize,
  pub timeout: Duration,
}

impl FetchOptions {
  pub fn from_args(args: &[String]) -> anyhow::Result<Self> {
    let mut url = None;
    let mut out = None;
    let mut max_bytes = DEFAULT_MAX_BYTES;
    let mut timeout_secs = DEFAULT_TIMEOUT_SECS;

    let mut it = args.iter().skip(1);
    while let Some(arg) = it.next() {
      match arg.as_str() {
        "--out" => out = Some(PathBuf::from(flag_value(&mut it, "--out")?)),
        "--max-bytes" => {
          max_bytes = flag_value(&mut it, "--max-bytes")?
            .parse()
            .context("`--max-bytes` expects a byte count")?;
        }
        "--timeout-secs" => {
          timeout_secs = flag_value(&mut it, "--timeout-secs")?
            .parse()
            .context("`--timeout-secs` expects whole seconds")?;
        }
        other if other.starts_with("--") => anyhow::bail!("unknown flag `{other}`"),
        other => {
          if url.is_some() {
            anyhow::bail!("expected a single URL, got another: {other}");
          }
          url = Some(Url::parse(other).with_context(|| format!("invalid URL: {other}"))?);
        }
      }
    }

    let url = url.ok_or_else(|| {
      anyhow::anyhow!("usage: hostlink-fetch <url> [--out <path>] [--max-bytes N] [--timeout-secs N]")
    })?;
    if !matches!(url.scheme(), "http" | "https") {
      anyhow::bail!("only http and https URLs can be fetched");
    }
    if max_bytes == 0 || timeout_secs == 0 {
      anyhow::bail!("`--max-bytes` and `--timeout-secs` must be > 0");
    }

    Ok(Self {
      url,
      out,
      max_bytes,
      timeout: Duration::from_secs(timeout_secs),
    })
  }
}

fn flag_value<'a>(
  it: &mut impl Iterator<Item = &'a String>,
  flag: &str,
) -> anyhow::Result<&'a String> {
  it.next()
    .ok_or_else(|| anyhow::anyhow!("`{flag}` needs a value"))
}

/// Installs stderr logging unless the process already has a subscriber.
pub fn init_logging(level: &str) {
  if let Err(e) = logging::init_stderr(level) {
    tracing::debug!(error = %e, "keeping existing tracing subscriber");
  }
}

pub fn run(opts: &FetchOptions) -> anyhow::Result<()> {
  let env = Environment::load(&paths::base_dir(), true)?;
  init_logging(&env.config.logging.level);

  let factory = ProxyClientFactory::new().with_timeout(opts.timeout);
  let selector = env.selector_with(&factory);

  let selected = selector.select().context("select outbound client")?;
  tracing::info!(route = ?selected.route, url = %safe_url_label(&opts.url), "fetching");

  let body = http_get_bytes(&selected.client, &opts.url, opts.max_bytes)?;
  match &opts.out {
    Some(path) => {
      write_atomic(path, &body)?;
      tracing::info!(bytes = body.len(), path = %path.display(), "saved");
    }
    None => {
      let mut stdout = std::io::stdout().lock();
      stdout.write_all(&body)?;
      stdout.flush()?;
    }
  }
  Ok(())
}

pub fn http_get_bytes(client: &Client, url: &Url, max_bytes: usize) -> anyhow::Result<Vec<u8>> {
  let response = client
    .get(url.clone())
    .send()
    .with_context(|| format!("GET {}", safe_url_label(url)))?;

  let status = response.status();
  if !status.is_success() {
    anyhow::bail!(
      "unexpected HTTP status {} for {}",
      status.as_u16(),
      safe_url_label(url)
    );
  }

  read_with_limit(response, max_bytes)
}

fn read_with_limit(reader: impl Read, max_bytes: usize) -> anyhow::Result<Vec<u8>> {
  let mut out = Vec::new();
  reader
    .take(max_bytes.saturating_add(1) as u64)
    .read_to_end(&mut out)
    .context("read response body")?;

  if out.len() > max_bytes {
    anyhow::bail!("response exceeds max size {} bytes", max_bytes);
  }
  Ok(out)
}

/// Host and path only; subscription URLs carry tokens in the query.
fn safe_url_label(url: &Url) -> String {
  let host = url.host_str().unwrap_or("<no-host>");
  let path = match url.path() {
    "" => "/",
    p => p,
  };
  format!("{host}{path}")
}

fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
  let parent = match path.parent() {
    Some(p) if !p.as_os_str().is_empty() => p,
    _ => Path::new("."),
  };
  fs::create_dir_all(parent)?;

  let tmp = parent.join(format!(
    ".{}.tmp",
    path.file_name().unwrap_or_default().to_string_lossy()
  ));
  fs::write(&tmp, contents).with_context(|| format!("write {}", tmp.display()))?;
  fs::rename(&tmp, path).with_context(|| format!("rename into {}", path.display()))?;
  Ok(())
}
