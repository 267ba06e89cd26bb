//! Query client: the cache layer between views and the network.
//!
//! Every read goes through [`QueryClient::query`]:
//! 1. Fresh cached value: returned immediately, no network call
//! 2. Stale cached value: returned immediately, revalidated in the background
//! 3. No usable value: a fetch is started (or joined, if one is already in
//!    flight for the same key) and the caller waits for it
//!
//! At most one fetch per key is in flight at any time. Fetches run in their own
//! task, so a caller that goes away does not cancel a fetch other readers may
//! be waiting on; the result still lands in the cache.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::key::QueryKey;
use super::storage::{CacheStorage, NoopStorage};
use super::subscription::Subscription;
use super::traits::Cacheable;
use crate::error::QueryError;
use crate::query::{QueryResult, QueryStatus};

/// A cached value with its concrete type erased.
pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;

type FetchOutput = Result<ErasedValue, QueryError>;
type SharedFetch = Shared<BoxFuture<'static, FetchOutput>>;
type ErasedFetcher = Arc<dyn Fn() -> BoxFuture<'static, FetchOutput> + Send + Sync>;
/// Snapshot-store value used to seed a new entry.
type Seed = (ErasedValue, DateTime<Utc>);
/// A fetch a reader is waiting on, by id.
type Pending = (u64, SharedFetch);

/// Timing and retry policy for a [`QueryClient`].
#[derive(Debug, Clone)]
pub struct QueryConfig {
  /// How long after a successful fetch the value counts as fresh
  pub stale_time: Duration,
  /// How long an entry without subscribers survives before eviction
  pub cache_time: Duration,
  /// Per-attempt limit for fetches and mutations
  pub request_timeout: Duration,
  /// Automatic retries for transient failures
  pub retry: u32,
  /// Delay before the first retry; doubles on every further attempt
  pub retry_delay: Duration,
  pub max_retry_delay: Duration,
}

impl Default for QueryConfig {
  fn default() -> Self {
    Self {
      stale_time: Duration::from_secs(60),
      cache_time: Duration::from_secs(5 * 60),
      request_timeout: Duration::from_secs(10),
      retry: 1,
      retry_delay: Duration::from_millis(500),
      max_retry_delay: Duration::from_secs(30),
    }
  }
}

impl QueryConfig {
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  pub fn with_cache_time(mut self, cache_time: Duration) -> Self {
    self.cache_time = cache_time;
    self
  }

  pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
    self.request_timeout = timeout;
    self
  }

  pub fn with_retry(mut self, retry: u32, retry_delay: Duration) -> Self {
    self.retry = retry;
    self.retry_delay = retry_delay;
    self
  }

  /// Delay before retry number `attempt + 1`.
  pub fn backoff(&self, attempt: u32) -> Duration {
    self
      .retry_delay
      .saturating_mul(2u32.saturating_pow(attempt))
      .min(self.max_retry_delay)
  }
}

/// Type-erased fetcher plus what is needed to persist its output.
#[derive(Clone)]
struct Loader {
  fetch: ErasedFetcher,
  encode: fn(&ErasedValue) -> Option<Value>,
  kind: &'static str,
  persist: bool,
}

impl Loader {
  fn new<T, F, Fut>(fetcher: F) -> Self
  where
    T: Cacheable,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
  {
    let fetch: ErasedFetcher = Arc::new(move || {
      let fut = fetcher();
      async move { fut.await.map(|value| Arc::new(value) as ErasedValue) }.boxed()
    });

    Self {
      fetch,
      encode: encode_as::<T>,
      kind: T::resource_kind(),
      persist: T::persist(),
    }
  }
}

fn encode_as<T: Cacheable>(value: &ErasedValue) -> Option<Value> {
  (**value)
    .downcast_ref::<T>()
    .and_then(|v| serde_json::to_value(v).ok())
}

/// Point-in-time copy of an entry, broadcast to subscribers.
#[derive(Clone)]
pub(crate) struct Snapshot {
  status: QueryStatus,
  data: Option<ErasedValue>,
  error: Option<QueryError>,
  updated_at: Option<DateTime<Utc>>,
  fetched_at: Option<Instant>,
}

impl Snapshot {
  pub(crate) fn to_result<T: Cacheable>(&self, stale_time: Duration) -> QueryResult<T> {
    let mut status = self.status;
    let mut error = self.error.clone();

    let data = match &self.data {
      Some(value) => match Arc::clone(value).downcast::<T>() {
        Ok(data) => Some(data),
        Err(_) => {
          status = QueryStatus::Error;
          error = Some(QueryError::Decode(format!(
            "cached value is not a {}",
            T::resource_kind()
          )));
          None
        }
      },
      None => None,
    };

    let is_stale = data.is_some()
      && self
        .fetched_at
        .map_or(true, |at| at.elapsed() >= stale_time);

    QueryResult {
      status,
      data,
      error,
      updated_at: self.updated_at,
      is_stale,
    }
  }
}

struct InFlight {
  id: u64,
  future: SharedFetch,
  abort: AbortHandle,
}

/// One cache entry. Owned by the map; views only see [`Snapshot`]s.
struct Entry {
  /// Distinguishes this entry from a later one under the same key
  id: u64,
  status: QueryStatus,
  data: Option<ErasedValue>,
  error: Option<QueryError>,
  fetched_at: Option<Instant>,
  updated_at: Option<DateTime<Utc>>,
  /// Set when the data no longer reflects server state; cleared by the next
  /// successful fetch
  invalidated: bool,
  in_flight: Option<InFlight>,
  /// Most recently supplied fetcher, used to refetch on invalidation
  loader: Option<Loader>,
  subscribers: usize,
  last_accessed: Instant,
  notify: watch::Sender<Snapshot>,
}

impl Entry {
  fn new(id: u64) -> Self {
    let (notify, _) = watch::channel(Snapshot {
      status: QueryStatus::Idle,
      data: None,
      error: None,
      updated_at: None,
      fetched_at: None,
    });

    Self {
      id,
      status: QueryStatus::Idle,
      data: None,
      error: None,
      fetched_at: None,
      updated_at: None,
      invalidated: false,
      in_flight: None,
      loader: None,
      subscribers: 0,
      last_accessed: Instant::now(),
      notify,
    }
  }

  fn snapshot(&self) -> Snapshot {
    Snapshot {
      status: self.status,
      data: if self.invalidated {
        None
      } else {
        self.data.clone()
      },
      error: self.error.clone(),
      updated_at: self.updated_at,
      fetched_at: self.fetched_at,
    }
  }

  fn publish(&self) {
    self.notify.send_replace(self.snapshot());
  }

  fn has_usable_data(&self) -> bool {
    self.data.is_some() && !self.invalidated
  }

  fn is_fresh(&self, stale_time: Duration) -> bool {
    self
      .fetched_at
      .is_some_and(|at| at.elapsed() < stale_time)
  }

  /// Abort the fetch in flight, if any. Its readers move on to whatever
  /// replaces it.
  fn cancel_fetch(&mut self) {
    if let Some(in_flight) = self.in_flight.take() {
      in_flight.abort.abort();
    }
  }

  fn in_flight_id(&self) -> Option<u64> {
    self.in_flight.as_ref().map(|f| f.id)
  }
}

/// Shared state behind every clone of a [`QueryClient`].
pub(crate) struct Inner {
  config: QueryConfig,
  entries: Mutex<HashMap<QueryKey, Entry>>,
  storage: Arc<dyn CacheStorage>,
  persist: bool,
  next_id: AtomicU64,
}

impl Inner {
  fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry>> {
    // Entry updates are single assignments; a panic elsewhere cannot leave
    // the map half-written.
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn next_id(&self) -> u64 {
    self.next_id.fetch_add(1, Ordering::Relaxed)
  }

  /// Apply the outcome of fetch `fetch_id`, unless it has been superseded.
  fn complete(&self, key: &QueryKey, fetch_id: u64, loader: &Loader, result: &FetchOutput) {
    let mut entries = self.lock();
    let Some(entry) = entries.get_mut(key) else {
      debug!(key = %key, "Entry evicted before fetch completed, dropping result");
      return;
    };
    if entry.in_flight_id() != Some(fetch_id) {
      debug!(key = %key, "Fetch superseded, dropping result");
      return;
    }

    entry.in_flight = None;
    match result {
      Ok(value) => {
        entry.status = QueryStatus::Success;
        entry.data = Some(Arc::clone(value));
        entry.error = None;
        entry.fetched_at = Some(Instant::now());
        entry.updated_at = Some(Utc::now());
        entry.invalidated = false;
        debug!(key = %key, "Fetch succeeded");
      }
      Err(err) => {
        entry.status = QueryStatus::Error;
        entry.error = Some(err.clone());
        debug!(key = %key, error = %err, "Fetch failed");
      }
    }
    entry.publish();
    drop(entries);

    if let (true, true, Ok(value)) = (self.persist, loader.persist, result) {
      if let Some(json) = (loader.encode)(value) {
        if let Err(e) = self.storage.store(key, loader.kind, &json) {
          warn!(key = %key, "Failed to persist snapshot: {}", e);
        }
      }
    }
  }

  /// Drop one subscriber from the entry it was registered on.
  pub(crate) fn release(&self, key: &QueryKey, entry_id: u64) {
    let mut entries = self.lock();
    if let Some(entry) = entries.get_mut(key) {
      if entry.id == entry_id {
        entry.subscribers = entry.subscribers.saturating_sub(1);
        entry.last_accessed = Instant::now();
      }
    }
  }

  fn evict_expired(&self) -> usize {
    let cache_time = self.config.cache_time;
    let mut entries = self.lock();
    let before = entries.len();

    entries.retain(|key, entry| {
      let keep = entry.subscribers > 0
        || entry.in_flight.is_some()
        || entry.last_accessed.elapsed() < cache_time;
      if !keep {
        debug!(key = %key, "Evicting unused entry");
      }
      keep
    });

    before - entries.len()
  }
}

/// In-process query cache with request coalescing and stale-while-revalidate.
///
/// Cloning is cheap; clones share the same cache.
#[derive(Clone)]
pub struct QueryClient {
  inner: Arc<Inner>,
}

impl QueryClient {
  /// Create a client with an empty in-memory cache and no persistence.
  pub fn new(config: QueryConfig) -> Self {
    Self::build(config, Arc::new(NoopStorage), false)
  }

  /// Create a client that persists successful fetches to `storage` and
  /// hydrates new entries from it.
  pub fn with_storage(config: QueryConfig, storage: Arc<dyn CacheStorage>) -> Self {
    Self::build(config, storage, true)
  }

  fn build(config: QueryConfig, storage: Arc<dyn CacheStorage>, persist: bool) -> Self {
    Self {
      inner: Arc::new(Inner {
        config,
        entries: Mutex::new(HashMap::new()),
        storage,
        persist,
        next_id: AtomicU64::new(1),
      }),
    }
  }

  pub fn config(&self) -> &QueryConfig {
    &self.inner.config
  }

  /// Read `key`, fetching with `fetcher` when there is no usable cached value.
  ///
  /// Never fails: errors are reported through [`QueryResult::error`].
  pub async fn query<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> QueryResult<T>
  where
    T: Cacheable,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
  {
    let stale_time = self.inner.config.stale_time;
    let loader = Loader::new(fetcher);
    let seed = self.seed::<T>(key);

    let pending = {
      let mut entries = self.inner.lock();
      let entry = self.touch(&mut entries, key, seed, &loader);

      if entry.has_usable_data() {
        if entry.in_flight.is_none() && !entry.is_fresh(stale_time) {
          debug!(key = %key, "Serving stale data, revalidating in background");
          self.start_fetch(key, entry, loader);
        } else {
          debug!(key = %key, "Cache hit");
        }
        return entry.snapshot().to_result(stale_time);
      }

      self.join_or_start(key, entry, loader.clone())
    };

    self.wait(key, pending, loader).await
  }

  /// Force a new fetch cycle for `key` and wait for it.
  ///
  /// Joins the in-flight fetch instead if there is one.
  pub async fn refetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> QueryResult<T>
  where
    T: Cacheable,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
  {
    let loader = Loader::new(fetcher);
    let seed = self.seed::<T>(key);

    let pending = {
      let mut entries = self.inner.lock();
      let entry = self.touch(&mut entries, key, seed, &loader);
      self.join_or_start(key, entry, loader.clone())
    };

    self.wait(key, pending, loader).await
  }

  /// Register interest in `key`.
  ///
  /// Starts a fetch unless the entry already holds fresh data or a fetch is
  /// in flight. Must be called from within a tokio runtime.
  pub fn subscribe<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Subscription<T>
  where
    T: Cacheable,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
  {
    let stale_time = self.inner.config.stale_time;
    let loader = Loader::new(fetcher);
    let seed = self.seed::<T>(key);

    let mut entries = self.inner.lock();
    let entry = self.touch(&mut entries, key, seed, &loader);
    entry.subscribers += 1;

    let fresh = entry.has_usable_data() && entry.is_fresh(stale_time);
    if entry.in_flight.is_none() && !fresh {
      self.start_fetch(key, entry, loader);
    }

    debug!(key = %key, subscribers = entry.subscribers, "Subscribed");
    Subscription::new(
      key.clone(),
      entry.id,
      entry.notify.subscribe(),
      Arc::downgrade(&self.inner),
      stale_time,
    )
  }

  /// Deregister a subscription. Dropping the handle does the same.
  pub fn unsubscribe<T>(&self, subscription: Subscription<T>) {
    drop(subscription);
  }

  /// Current state of `key`, without fetching.
  pub fn peek<T: Cacheable>(&self, key: &QueryKey) -> Option<QueryResult<T>> {
    let entries = self.inner.lock();
    entries
      .get(key)
      .map(|entry| entry.snapshot().to_result(self.inner.config.stale_time))
  }

  /// Run a write against the backend and, if it succeeds, invalidate every
  /// key in `invalidates`.
  ///
  /// Mutations are bounded by the request timeout and never retried.
  pub async fn mutate<R, F, Fut>(&self, invalidates: &[QueryKey], mutation: F) -> Result<R, QueryError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<R, QueryError>>,
  {
    let timeout = self.inner.config.request_timeout;
    let value = match tokio::time::timeout(timeout, mutation()).await {
      Ok(Ok(value)) => value,
      Ok(Err(err)) => {
        warn!(error = %err, "Mutation failed");
        return Err(err);
      }
      Err(_) => {
        warn!(?timeout, "Mutation timed out");
        return Err(QueryError::Timeout(timeout));
      }
    };

    for key in invalidates {
      self.invalidate(key);
    }
    info!(invalidated = invalidates.len(), "Mutation succeeded");

    Ok(value)
  }

  /// Mark `key` as out of date.
  ///
  /// An entry nobody is subscribed to is evicted. An entry with live
  /// subscribers is refetched right away, and readers wait for the new value
  /// instead of seeing the old one. Returns whether an entry existed.
  pub fn invalidate(&self, key: &QueryKey) -> bool {
    let existed = {
      let mut entries = self.inner.lock();
      self.invalidate_locked(&mut entries, key)
    };

    if self.inner.persist {
      if let Err(e) = self.inner.storage.remove(key) {
        warn!(key = %key, "Failed to remove snapshot: {}", e);
      }
    }

    existed
  }

  /// Invalidate every key of a resource. Returns how many entries existed.
  pub fn invalidate_resource(&self, resource: &str) -> usize {
    let count = {
      let mut entries = self.inner.lock();
      let keys: Vec<QueryKey> = entries
        .keys()
        .filter(|k| k.resource() == resource)
        .cloned()
        .collect();
      for key in &keys {
        self.invalidate_locked(&mut entries, key);
      }
      keys.len()
    };

    if self.inner.persist {
      if let Err(e) = self.inner.storage.remove_resource(resource) {
        warn!(resource, "Failed to remove snapshots: {}", e);
      }
    }

    count
  }

  fn invalidate_locked(&self, entries: &mut HashMap<QueryKey, Entry>, key: &QueryKey) -> bool {
    let Some(subscribers) = entries.get(key).map(|e| e.subscribers) else {
      return false;
    };

    if subscribers == 0 {
      if let Some(mut entry) = entries.remove(key) {
        entry.cancel_fetch();
      }
      info!(key = %key, "Invalidated, entry evicted");
      return true;
    }

    if let Some(entry) = entries.get_mut(key) {
      entry.invalidated = true;
      match entry.loader.clone() {
        Some(loader) => {
          self.start_fetch(key, entry, loader);
        }
        None => {
          entry.cancel_fetch();
          entry.publish();
        }
      }
      info!(key = %key, subscribers, "Invalidated, refetching");
    }
    true
  }

  /// Evict entries without subscribers that have not been used for
  /// `cache_time`. Returns how many were evicted.
  pub fn evict_expired(&self) -> usize {
    self.inner.evict_expired()
  }

  /// Run [`evict_expired`](Self::evict_expired) every `interval` until the
  /// client is dropped.
  pub fn spawn_gc(&self, interval: Duration) -> JoinHandle<()> {
    let inner = Arc::downgrade(&self.inner);
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      // The first tick completes immediately
      ticker.tick().await;
      loop {
        ticker.tick().await;
        let Some(shared) = inner.upgrade() else {
          break;
        };
        let evicted = shared.evict_expired();
        if evicted > 0 {
          debug!(evicted, "Cache GC pass");
        }
      }
    })
  }

  /// Drop every entry. Subscriptions see their entry go away.
  pub fn clear(&self) {
    let mut entries = self.inner.lock();
    let count = entries.len();
    for entry in entries.values_mut() {
      entry.cancel_fetch();
    }
    entries.clear();
    debug!(count, "Cache cleared");
  }

  /// Wipe the persistent snapshot store.
  pub fn clear_persisted(&self) -> color_eyre::Result<()> {
    self.inner.storage.clear()
  }

  pub fn len(&self) -> usize {
    self.inner.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.inner.lock().is_empty()
  }

  pub fn contains(&self, key: &QueryKey) -> bool {
    self.inner.lock().contains_key(key)
  }

  /// Load the snapshot for `key` if no entry exists yet.
  ///
  /// Runs before the map lock is taken so a slow store never blocks other
  /// readers. The seed is dropped if another reader creates the entry first.
  fn seed<T: Cacheable>(&self, key: &QueryKey) -> Option<Seed> {
    if !self.inner.persist || !T::persist() || self.contains(key) {
      return None;
    }
    self.hydrate::<T>(key)
  }

  /// Get or create the entry for `key` and record this access.
  fn touch<'a>(
    &self,
    entries: &'a mut HashMap<QueryKey, Entry>,
    key: &QueryKey,
    seed: Option<Seed>,
    loader: &Loader,
  ) -> &'a mut Entry {
    let entry = entries
      .entry(key.clone())
      .or_insert_with(|| self.new_entry(key, seed));
    entry.last_accessed = Instant::now();
    entry.loader = Some(loader.clone());
    entry
  }

  fn new_entry(&self, key: &QueryKey, seed: Option<Seed>) -> Entry {
    let mut entry = Entry::new(self.inner.next_id());

    if let Some((value, cached_at)) = seed {
      let age = (Utc::now() - cached_at).to_std().unwrap_or_default();
      entry.status = QueryStatus::Success;
      entry.data = Some(value);
      entry.updated_at = Some(cached_at);
      entry.fetched_at = Instant::now().checked_sub(age);
      entry.publish();
      debug!(key = %key, ?age, "Hydrated entry from snapshot");
    }

    entry
  }

  fn hydrate<T: Cacheable>(&self, key: &QueryKey) -> Option<Seed> {
    let snapshot = match self.inner.storage.load(key) {
      Ok(Some(snapshot)) => snapshot,
      Ok(None) => return None,
      Err(e) => {
        warn!(key = %key, "Failed to load snapshot: {}", e);
        return None;
      }
    };

    if snapshot.kind != T::resource_kind() {
      debug!(key = %key, kind = %snapshot.kind, "Snapshot kind mismatch, ignoring");
      return None;
    }

    match serde_json::from_value::<T>(snapshot.data) {
      Ok(value) => Some((Arc::new(value) as ErasedValue, snapshot.cached_at)),
      Err(e) => {
        warn!(key = %key, "Failed to decode snapshot: {}", e);
        None
      }
    }
  }

  fn join_or_start(&self, key: &QueryKey, entry: &mut Entry, loader: Loader) -> Pending {
    match &entry.in_flight {
      Some(in_flight) => {
        debug!(key = %key, "Joining in-flight fetch");
        (in_flight.id, in_flight.future.clone())
      }
      None => self.start_fetch(key, entry, loader),
    }
  }

  /// Start a fetch cycle for `entry`, aborting the one it replaces. The
  /// caller holds the map lock.
  fn start_fetch(&self, key: &QueryKey, entry: &mut Entry, loader: Loader) -> Pending {
    if let Some(previous) = entry.in_flight.take() {
      previous.abort.abort();
      debug!(key = %key, fetch_id = previous.id, "Aborted superseded fetch");
    }

    let fetch_id = self.inner.next_id();
    let inner = Arc::clone(&self.inner);
    let task_key = key.clone();

    let task = tokio::spawn(async move {
      let result = run_fetch(&inner.config, &task_key, &loader).await;
      inner.complete(&task_key, fetch_id, &loader, &result);
      result
    });
    let abort = task.abort_handle();

    let future = async move { task.await.unwrap_or(Err(QueryError::Cancelled)) }
      .boxed()
      .shared();

    entry.status = QueryStatus::Loading;
    entry.error = None;
    entry.in_flight = Some(InFlight {
      id: fetch_id,
      future: future.clone(),
      abort,
    });
    entry.publish();
    debug!(key = %key, fetch_id, "Fetch started");

    (fetch_id, future)
  }

  /// Wait for a fetch and turn its outcome into a result.
  ///
  /// A reader whose fetch was superseded follows the replacement; one whose
  /// entry was evicted mid-fetch starts over.
  async fn wait<T: Cacheable>(
    &self,
    key: &QueryKey,
    mut pending: Pending,
    loader: Loader,
  ) -> QueryResult<T> {
    let stale_time = self.inner.config.stale_time;

    loop {
      let (fetch_id, future) = pending;
      let outcome = future.await;
      let aborted = matches!(outcome, Err(QueryError::Cancelled));

      {
        let mut entries = self.inner.lock();
        match entries.get_mut(key) {
          Some(entry) => match entry.in_flight_id() {
            Some(current) if current != fetch_id => {
              debug!(key = %key, fetch_id, "Fetch superseded, following replacement");
              pending = self.join_or_start(key, entry, loader.clone());
              continue;
            }
            None if aborted && entry.has_usable_data() => {
              return entry.snapshot().to_result(stale_time);
            }
            None if aborted => {
              pending = self.start_fetch(key, entry, loader.clone());
              continue;
            }
            _ => return settle(entry, outcome, stale_time),
          },
          None if !aborted => return detached(outcome, stale_time),
          None => {}
        }
      }

      debug!(key = %key, "Entry evicted during fetch, starting over");
      let seed = self.seed::<T>(key);
      pending = {
        let mut entries = self.inner.lock();
        let entry = self.touch(&mut entries, key, seed, &loader);
        self.join_or_start(key, entry, loader.clone())
      };
    }
  }
}

/// Result for a reader whose fetch finished while its entry still exists.
fn settle<T: Cacheable>(
  entry: &Entry,
  outcome: FetchOutput,
  stale_time: Duration,
) -> QueryResult<T> {
  let landed = |value: &ErasedValue| {
    entry.has_usable_data() && entry.data.as_ref().is_some_and(|d| Arc::ptr_eq(d, value))
  };

  match outcome {
    // Report the entry's own timestamps
    Ok(value) if landed(&value) => entry.snapshot().to_result(stale_time),
    Ok(value) => detached(Ok(value), stale_time),
    // Keep serving older data if the entry still vouches for it
    Err(error) => Snapshot {
      status: QueryStatus::Error,
      error: Some(error),
      ..entry.snapshot()
    }
    .to_result(stale_time),
  }
}

/// Result for a fetch whose value never landed in the cache. It predates
/// whatever replaced it, so it is reported as stale.
fn detached<T: Cacheable>(outcome: FetchOutput, stale_time: Duration) -> QueryResult<T> {
  match outcome {
    Ok(value) => Snapshot {
      status: QueryStatus::Success,
      data: Some(value),
      error: None,
      updated_at: None,
      fetched_at: None,
    }
    .to_result(stale_time),
    Err(error) => QueryResult::failed(error),
  }
}

/// Run one fetch cycle: timeout per attempt, retry transient failures with
/// exponential backoff.
async fn run_fetch(config: &QueryConfig, key: &QueryKey, loader: &Loader) -> FetchOutput {
  let mut attempt = 0;
  loop {
    let result = match tokio::time::timeout(config.request_timeout, (loader.fetch)()).await {
      Ok(result) => result,
      Err(_) => Err(QueryError::Timeout(config.request_timeout)),
    };

    match result {
      Err(err) if err.is_transient() && attempt < config.retry => {
        let delay = config.backoff(attempt);
        attempt += 1;
        warn!(key = %key, attempt, ?delay, "Fetch failed, retrying: {}", err);
        tokio::time::sleep(delay).await;
      }
      other => return other,
    }
  }
}
