//! Error taxonomy for remote data access.

use std::fmt;
use std::time::Duration;

/// Failure of a single fetch or mutation against the backend.
///
/// Every variant is cheap to clone so that a coalesced fetch can hand the same
/// error to all of its waiters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
  /// No response was received (connection refused, DNS, TLS, reset...)
  #[error("network error: {0}")]
  Network(String),
  /// The request did not complete within the configured duration
  #[error("request timed out after {0:?}")]
  Timeout(Duration),
  #[error("unauthorized")]
  Unauthorized,
  #[error("forbidden")]
  Forbidden,
  #[error("not found")]
  NotFound,
  /// Any other 4xx response
  #[error("client error: HTTP {0}")]
  Client(u16),
  /// 5xx response
  #[error("server error: HTTP {0}")]
  Server(u16),
  /// The payload did not match the expected shape
  #[error("failed to decode response: {0}")]
  Decode(String),
  /// The fetch task ended without producing a result
  #[error("fetch was cancelled")]
  Cancelled,
}

/// Coarse classification of a [`QueryError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  Network,
  Timeout,
  Client,
  Server,
  Decode,
  Cancelled,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ErrorKind::Network => "network",
      ErrorKind::Timeout => "timeout",
      ErrorKind::Client => "client",
      ErrorKind::Server => "server",
      ErrorKind::Decode => "decode",
      ErrorKind::Cancelled => "cancelled",
    };
    f.write_str(name)
  }
}

impl QueryError {
  /// Map a non-success HTTP status code to an error.
  pub fn from_status(status: u16) -> Self {
    match status {
      401 => QueryError::Unauthorized,
      403 => QueryError::Forbidden,
      404 => QueryError::NotFound,
      500..=599 => QueryError::Server(status),
      _ => QueryError::Client(status),
    }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      QueryError::Network(_) => ErrorKind::Network,
      QueryError::Timeout(_) => ErrorKind::Timeout,
      QueryError::Unauthorized
      | QueryError::Forbidden
      | QueryError::NotFound
      | QueryError::Client(_) => ErrorKind::Client,
      QueryError::Server(_) => ErrorKind::Server,
      QueryError::Decode(_) => ErrorKind::Decode,
      QueryError::Cancelled => ErrorKind::Cancelled,
    }
  }

  /// Whether an automatic retry may succeed.
  ///
  /// Only network failures, timeouts and 5xx responses are retried; client
  /// errors and decode failures would fail the same way again.
  pub fn is_transient(&self) -> bool {
    matches!(
      self.kind(),
      ErrorKind::Network | ErrorKind::Timeout | ErrorKind::Server
    )
  }
}

impl From<serde_json::Error> for QueryError {
  fn from(err: serde_json::Error) -> Self {
    QueryError::Decode(err.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_mapping() {
    assert_eq!(QueryError::from_status(401), QueryError::Unauthorized);
    assert_eq!(QueryError::from_status(403), QueryError::Forbidden);
    assert_eq!(QueryError::from_status(404), QueryError::NotFound);
    assert_eq!(QueryError::from_status(429), QueryError::Client(429));
    assert_eq!(QueryError::from_status(503), QueryError::Server(503));
  }

  #[test]
  fn test_transient_kinds() {
    assert!(QueryError::Network("reset".into()).is_transient());
    assert!(QueryError::Timeout(Duration::from_secs(1)).is_transient());
    assert!(QueryError::Server(502).is_transient());

    assert!(!QueryError::NotFound.is_transient());
    assert!(!QueryError::Unauthorized.is_transient());
    assert!(!QueryError::Client(422).is_transient());
    assert!(!QueryError::Decode("missing field".into()).is_transient());
    assert!(!QueryError::Cancelled.is_transient());
  }

  #[test]
  fn test_kind_groups_client_errors() {
    assert_eq!(QueryError::NotFound.kind(), ErrorKind::Client);
    assert_eq!(QueryError::Forbidden.kind(), ErrorKind::Client);
    assert_eq!(QueryError::Server(500).kind(), ErrorKind::Server);
  }

  #[test]
  fn test_decode_from_serde() {
    let err = serde_json::from_str::<u32>("\"nope\"").unwrap_err();
    assert_eq!(QueryError::from(err).kind(), ErrorKind::Decode);
  }
}
