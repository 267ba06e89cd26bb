//! Query state as seen by views.
//!
//! Inspired by TanStack Query: every read through the cache layer yields a
//! [`QueryResult`] carrying the last known data together with loading and
//! error state, instead of a `Result` that a view would have to unwrap.
//!
//! # Example
//!
//! ```ignore
//! let result = api.dungeon_stats("season-tww-2", Region::Us).await;
//!
//! match result.status() {
//!     QueryStatus::Loading if result.data().is_none() => render_spinner(),
//!     QueryStatus::Error => render_error(result.error()),
//!     _ => render_data(result.data()),
//! }
//! ```

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

use crate::error::QueryError;

/// Lifecycle status of a cache entry.
///
/// Transitions only along `Idle -> Loading -> {Success | Error}`; a retry or
/// revalidation moves `Success`/`Error` back to `Loading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
  /// No fetch has been started
  Idle,
  /// A fetch is in flight (data from an earlier fetch may still be present)
  Loading,
  /// The last fetch succeeded
  Success,
  /// The last fetch failed
  Error,
}

impl fmt::Display for QueryStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      QueryStatus::Idle => "idle",
      QueryStatus::Loading => "loading",
      QueryStatus::Success => "success",
      QueryStatus::Error => "error",
    };
    f.write_str(name)
  }
}

/// The `{ data, isLoading, error }` view of one cache entry.
#[derive(Debug)]
pub struct QueryResult<T> {
  pub(crate) status: QueryStatus,
  pub(crate) data: Option<Arc<T>>,
  pub(crate) error: Option<QueryError>,
  pub(crate) updated_at: Option<DateTime<Utc>>,
  pub(crate) is_stale: bool,
}

impl<T> QueryResult<T> {
  pub(crate) fn failed(error: QueryError) -> Self {
    Self {
      status: QueryStatus::Error,
      data: None,
      error: Some(error),
      updated_at: None,
      is_stale: false,
    }
  }

  pub fn status(&self) -> QueryStatus {
    self.status
  }

  /// Last successfully fetched value, if any.
  pub fn data(&self) -> Option<&T> {
    self.data.as_deref()
  }

  /// Shared handle to the cached value.
  pub fn data_arc(&self) -> Option<Arc<T>> {
    self.data.clone()
  }

  pub fn error(&self) -> Option<&QueryError> {
    self.error.as_ref()
  }

  pub fn is_loading(&self) -> bool {
    self.status == QueryStatus::Loading
  }

  pub fn is_success(&self) -> bool {
    self.status == QueryStatus::Success
  }

  pub fn is_error(&self) -> bool {
    self.status == QueryStatus::Error
  }

  /// Whether the data is older than the freshness threshold.
  pub fn is_stale(&self) -> bool {
    self.is_stale
  }

  /// When the data was last fetched (wall clock).
  pub fn updated_at(&self) -> Option<DateTime<Utc>> {
    self.updated_at
  }

  /// Consume the result, keeping only the value or the error.
  ///
  /// Stale data wins over a later error, matching what a view would render.
  pub fn into_result(self) -> Result<Arc<T>, QueryError> {
    match (self.data, self.error) {
      (Some(data), _) => Ok(data),
      (None, Some(err)) => Err(err),
      (None, None) => Err(QueryError::Cancelled),
    }
  }
}

impl<T> Clone for QueryResult<T> {
  fn clone(&self) -> Self {
    Self {
      status: self.status,
      data: self.data.clone(),
      error: self.error.clone(),
      updated_at: self.updated_at,
      is_stale: self.is_stale,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn success(value: u32) -> QueryResult<u32> {
    QueryResult {
      status: QueryStatus::Success,
      data: Some(Arc::new(value)),
      error: None,
      updated_at: Some(Utc::now()),
      is_stale: false,
    }
  }

  #[test]
  fn test_success_accessors() {
    let result = success(42);
    assert!(result.is_success());
    assert!(!result.is_loading());
    assert_eq!(result.data(), Some(&42));
    assert!(result.error().is_none());
  }

  #[test]
  fn test_failed_has_no_data() {
    let result: QueryResult<u32> = QueryResult::failed(QueryError::NotFound);
    assert!(result.is_error());
    assert_eq!(result.data(), None);
    assert_eq!(result.error(), Some(&QueryError::NotFound));
    assert_eq!(result.into_result().unwrap_err(), QueryError::NotFound);
  }

  #[test]
  fn test_stale_data_wins_over_error() {
    let result = QueryResult {
      status: QueryStatus::Error,
      data: Some(Arc::new(7u32)),
      error: Some(QueryError::Server(503)),
      updated_at: None,
      is_stale: true,
    };
    assert_eq!(*result.into_result().unwrap(), 7);
  }

  #[test]
  fn test_loading_keeps_previous_data() {
    let mut result = success(1);
    result.status = QueryStatus::Loading;
    assert!(result.is_loading());
    assert_eq!(result.data(), Some(&1));
  }
}
