//! Backend REST API access.

pub mod api_types;
pub mod cached_client;
pub mod client;
pub mod keys;
pub mod types;

pub use cached_client::CachedApiClient;
pub use keys::{ApiQuery, InvalidQuery};

use crate::cache::KeyError;
use crate::error::QueryError;

/// Failure of a write issued through [`CachedApiClient`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
  #[error(transparent)]
  Invalid(#[from] InvalidQuery),
  #[error(transparent)]
  Query(#[from] QueryError),
}

impl From<KeyError> for ApiError {
  fn from(err: KeyError) -> Self {
    ApiError::Invalid(err.into())
  }
}
