//! Query cache for remote data access.
//!
//! This module provides a backend-agnostic caching layer that:
//! - Indexes results by [`QueryKey`] (resource name + ordered parameters)
//! - Coalesces concurrent requests for the same key into one fetch
//! - Serves stale data immediately while revalidating in the background
//! - Retries transient failures with exponential backoff
//! - Invalidates keys after mutations so later reads never see old data
//! - Optionally persists snapshots to SQLite for offline reads

mod key;
mod layer;
mod storage;
mod subscription;
mod traits;

pub use key::{KeyError, QueryKey};
pub use layer::{QueryClient, QueryConfig};
pub use storage::{CacheStorage, NoopStorage, SqliteStorage, StoredSnapshot};
pub use subscription::Subscription;
pub use traits::Cacheable;
