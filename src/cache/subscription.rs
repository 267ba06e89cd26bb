//! Subscription handles: a view's registration of interest in one key.

use std::marker::PhantomData;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::watch;

use super::key::QueryKey;
use super::layer::{Inner, Snapshot};
use super::traits::Cacheable;
use crate::query::QueryResult;

/// Live view onto one cache entry.
///
/// Every subscriber of a key observes the same entry. Dropping the handle
/// unsubscribes; once an entry has no subscribers left, its time-to-live
/// starts counting.
pub struct Subscription<T> {
  key: QueryKey,
  entry_id: u64,
  rx: watch::Receiver<Snapshot>,
  client: Weak<Inner>,
  stale_time: Duration,
  _marker: PhantomData<fn() -> T>,
}

impl<T> Subscription<T> {
  pub(crate) fn new(
    key: QueryKey,
    entry_id: u64,
    rx: watch::Receiver<Snapshot>,
    client: Weak<Inner>,
    stale_time: Duration,
  ) -> Self {
    Self {
      key,
      entry_id,
      rx,
      client,
      stale_time,
      _marker: PhantomData,
    }
  }

  pub fn key(&self) -> &QueryKey {
    &self.key
  }
}

impl<T: Cacheable> Subscription<T> {
  /// Current state of the entry.
  pub fn current(&self) -> QueryResult<T> {
    self.rx.borrow().to_result(self.stale_time)
  }

  /// Returns `true` if the entry changed since the last call.
  ///
  /// Non-blocking; meant to be called from a tick handler.
  pub fn poll(&mut self) -> bool {
    match self.rx.has_changed() {
      Ok(true) => {
        drop(self.rx.borrow_and_update());
        true
      }
      _ => false,
    }
  }

  /// Wait for the next change.
  ///
  /// Returns `false` once the entry has been removed from the cache.
  pub async fn changed(&mut self) -> bool {
    self.rx.changed().await.is_ok()
  }
}

impl<T> Drop for Subscription<T> {
  fn drop(&mut self) {
    if let Some(client) = self.client.upgrade() {
      client.release(&self.key, self.entry_id);
    }
  }
}

impl<T> std::fmt::Debug for Subscription<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Subscription")
      .field("key", &self.key)
      .field("entry_id", &self.entry_id)
      .finish_non_exhaustive()
  }
}
