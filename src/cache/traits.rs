//! Core traits for the caching system.

use serde::{de::DeserializeOwned, Serialize};

/// Trait for resource payloads that can be cached.
///
/// The value is kept in memory behind an `Arc` and, when persistence is
/// enabled, serialized to JSON for the snapshot store.
pub trait Cacheable: Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Resource kind name used to tag persisted snapshots (e.g. "character").
  ///
  /// A snapshot is only hydrated into a type whose kind matches the one it
  /// was stored with.
  fn resource_kind() -> &'static str;

  /// Whether values may be written to the snapshot store.
  ///
  /// Session-bound resources (tokens, account details) stay in memory only.
  fn persist() -> bool {
    true
  }
}
