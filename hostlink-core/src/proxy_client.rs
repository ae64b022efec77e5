use crate::error::{ClientError, ClientResult};
use reqwest::blocking::Client;
use reqwest::{Proxy, Url};
use serde::Serialize;
use std::time::Duration;

pub const SUPPORTED_SCHEMES: &[&str] = &["socks5", "socks5h", "http", "https"];

const USER_AGENT: &str = concat!("hostlink/", env!("CARGO_PKG_VERSION"));

/// Path a client's connections take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientRoute {
  Direct,
  Proxied { url: String },
}

/// A built client together with the route it was built for.
#[derive(Debug)]
pub struct SelectedClient {
  pub client: Client,
  pub route: ClientRoute,
}

/// Turns a proxy URL into something the transport can dial through.
///
/// The proxy itself is always reached directly; there is no chaining.
pub trait DialerFactory: Send + Sync {
  fn dialer_for(&self, url: &Url) -> Result<Proxy, String>;
}

/// Dialers backed by reqwest's own HTTP and SOCKS5 proxy support.
///
/// `socks5` hands target hostnames to the proxy unresolved, so it is dialed
/// as `socks5h`; reqwest's plain `socks5` resolves them locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReqwestDialers;

impl DialerFactory for ReqwestDialers {
  fn dialer_for(&self, url: &Url) -> Result<Proxy, String> {
    if !SUPPORTED_SCHEMES.contains(&url.scheme()) {
      return Err(format!("unsupported proxy scheme {:?}", url.scheme()));
    }

    let mut target = url.clone();
    if target.scheme() == "socks5" {
      target
        .set_scheme("socks5h")
        .map_err(|_| format!("cannot dial {url} with remote name resolution"))?;
    }
    Proxy::all(target.as_str()).map_err(|e| e.to_string())
  }
}

pub struct ProxyClientFactory {
  dialers: Box<dyn DialerFactory>,
  timeout: Option<Duration>,
}

impl ProxyClientFactory {
  pub fn new() -> Self {
    Self::with_dialers(Box::new(ReqwestDialers))
  }

  pub fn with_dialers(dialers: Box<dyn DialerFactory>) -> Self {
    Self {
      dialers,
      timeout: None,
    }
  }

  /// Per-request timeout applied to every client this factory builds.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  /// Client whose every connection goes through `proxy_url`. The route
  /// records `proxy_url` exactly as given.
  pub fn build(&self, proxy_url: &str) -> ClientResult<SelectedClient> {
    let url = parse_proxy_url(proxy_url)?;
    let proxy = self
      .dialers
      .dialer_for(&url)
      .map_err(|reason| ClientError::DialerConstruction {
        url: proxy_url.to_string(),
        reason,
      })?;

    tracing::debug!(proxy = proxy_url, "building proxied HTTP client");
    let client = self
      .builder()
      .proxy(proxy)
      .build()
      .map_err(ClientError::ClientBuild)?;
    Ok(SelectedClient {
      client,
      route: ClientRoute::Proxied {
        url: proxy_url.to_string(),
      },
    })
  }

  /// The default, unproxied client.
  pub fn direct(&self) -> ClientResult<SelectedClient> {
    let client = self.builder().build().map_err(ClientError::ClientBuild)?;
    Ok(SelectedClient {
      client,
      route: ClientRoute::Direct,
    })
  }

  fn builder(&self) -> reqwest::blocking::ClientBuilder {
    let builder = Client::builder().user_agent(USER_AGENT);
    match self.timeout {
      Some(t) => builder.timeout(t),
      None => builder,
    }
  }
}

impl Default for ProxyClientFactory {
  fn default() -> Self {
    Self::new()
  }
}

fn parse_proxy_url(raw: &str) -> ClientResult<Url> {
  let invalid = |reason: String| ClientError::InvalidUrl {
    url: raw.to_string(),
    reason,
  };

  // The URL parser silently drops tabs and newlines; refuse them up front.
  if raw.chars().any(|c| c.is_ascii_control()) {
    return Err(invalid("contains a control character".to_string()));
  }

  let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
  match url.host_str() {
    Some(h) if !h.is_empty() => Ok(url),
    _ => Err(invalid("missing host".to_string())),
  }
}
