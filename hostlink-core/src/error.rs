use thiserror::Error;

/// Failures while building an outbound HTTP client. None of these are retried.
#[derive(Error, Debug)]
pub enum ClientError {
  #[error("invalid proxy URL {url:?}: {reason}")]
  InvalidUrl { url: String, reason: String },

  #[error("cannot construct dialer for {url}: {reason}")]
  DialerConstruction { url: String, reason: String },

  #[error("build HTTP client: {0}")]
  ClientBuild(#[source] reqwest::Error),
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
