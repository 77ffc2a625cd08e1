//! Keyed cache store with observer notification and cancellable fetches.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::key::QueryKey;
use super::view::{CacheView, FetchStatus};
use crate::error::SyncError;

/// A boxed future that resolves to a fetched value.
pub type BoxFuture<V> = Pin<Box<dyn Future<Output = Result<V, SyncError>> + Send>>;

/// A factory creating the read that populates an entry.
pub type Fetcher<V> = Arc<dyn Fn() -> BoxFuture<V> + Send + Sync>;

/// Box a closure returning a future into a [`Fetcher`].
pub fn fetcher<V, F, Fut>(f: F) -> Fetcher<V>
where
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<V, SyncError>> + Send + 'static,
{
  Arc::new(move || Box::pin(f()))
}

struct Entry<V> {
  value: Option<V>,
  status: FetchStatus,
  updated_at: Option<DateTime<Utc>>,
  error: Option<SyncError>,
  /// Bumped on every fetch start and cancellation; a completing fetch only
  /// applies its result if its generation is still current.
  generation: u64,
  in_flight: Option<JoinHandle<()>>,
  fetcher: Option<Fetcher<V>>,
  tx: watch::Sender<CacheView<V>>,
}

impl<V: Clone> Entry<V> {
  fn new() -> Self {
    let (tx, _rx) = watch::channel(CacheView::empty());
    Self {
      value: None,
      status: FetchStatus::Invalid,
      updated_at: None,
      error: None,
      generation: 0,
      in_flight: None,
      fetcher: None,
      tx,
    }
  }

  fn view(&self) -> CacheView<V> {
    CacheView {
      value: self.value.clone(),
      status: self.status,
      updated_at: self.updated_at,
      error: self.error.clone(),
    }
  }

  fn notify(&self) {
    self.tx.send_replace(self.view());
  }

  /// Detach the running fetch, if any, so its result is never applied.
  fn detach_fetch(&mut self) -> Option<JoinHandle<()>> {
    let handle = self.in_flight.take()?;
    self.generation += 1;
    self.status = if self.value.is_some() {
      FetchStatus::Stale
    } else {
      FetchStatus::Invalid
    };
    Some(handle)
  }
}

/// Process-wide cache of query results.
///
/// Cheap to clone; all clones share the same entries. Every write is a total
/// replacement of an entry's value, and observers are notified before the
/// writing call returns. The lock is never held across an await.
pub struct CacheStore<V> {
  entries: Arc<Mutex<HashMap<QueryKey, Entry<V>>>>,
}

impl<V> Clone for CacheStore<V> {
  fn clone(&self) -> Self {
    Self {
      entries: Arc::clone(&self.entries),
    }
  }
}

impl<V: Clone + Send + Sync + 'static> Default for CacheStore<V> {
  fn default() -> Self {
    Self::new()
  }
}

impl<V: Clone + Send + Sync + 'static> CacheStore<V> {
  pub fn new() -> Self {
    Self {
      entries: Arc::new(Mutex::new(HashMap::new())),
    }
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Entry<V>>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Current value for `key`, or `None` if it was never populated.
  pub fn get(&self, key: QueryKey) -> Option<V> {
    self.lock().get(&key).and_then(|entry| entry.value.clone())
  }

  /// Current value and fetch state for `key`.
  pub fn view(&self, key: QueryKey) -> CacheView<V> {
    self
      .lock()
      .get(&key)
      .map(Entry::view)
      .unwrap_or_else(CacheView::empty)
  }

  /// Observe `key`. A live receiver makes the entry "observed", so
  /// invalidation refetches it in the background.
  pub fn subscribe(&self, key: QueryKey) -> watch::Receiver<CacheView<V>> {
    self
      .lock()
      .entry(key)
      .or_insert_with(Entry::new)
      .tx
      .subscribe()
  }

  /// Record how `key` is populated, without fetching it.
  pub fn register(&self, key: QueryKey, fetcher: Fetcher<V>) {
    self.lock().entry(key).or_insert_with(Entry::new).fetcher = Some(fetcher);
  }

  /// Replace the value at `key`.
  pub fn set(&self, key: QueryKey, value: V) {
    self.update(key, |_| Some(value));
  }

  /// Atomically compute and store a new value from the current one.
  ///
  /// If `f` returns `None` the entry is left untouched and no notification
  /// is sent. Returns whether a write happened.
  pub fn update<F>(&self, key: QueryKey, f: F) -> bool
  where
    F: FnOnce(Option<&V>) -> Option<V>,
  {
    let mut entries = self.lock();
    let entry = entries.entry(key).or_insert_with(Entry::new);

    let Some(next) = f(entry.value.as_ref()) else {
      return false;
    };

    entry.value = Some(next);
    entry.updated_at = Some(Utc::now());
    entry.error = None;
    if entry.status != FetchStatus::Fetching {
      entry.status = FetchStatus::Fresh;
    }
    entry.notify();
    true
  }

  /// Put a previously captured value back. An absent snapshot clears the
  /// entry.
  pub fn restore(&self, key: QueryKey, snapshot: Option<V>) {
    match snapshot {
      Some(value) => self.set(key, value),
      None => {
        let mut entries = self.lock();
        let entry = entries.entry(key).or_insert_with(Entry::new);
        entry.value = None;
        entry.updated_at = None;
        if entry.status != FetchStatus::Fetching {
          entry.status = FetchStatus::Invalid;
        }
        entry.notify();
      }
    }
  }

  /// Mark `key` stale. If anyone observes it, refetch in the background
  /// with the fetcher that last populated it. Never blocks.
  ///
  /// Outside a tokio runtime there is nothing to run the refetch on, so the
  /// entry is only marked stale and observers notified.
  pub fn invalidate(&self, key: QueryKey) {
    let mut entries = self.lock();
    let Some(entry) = entries.get_mut(&key) else {
      return;
    };

    let observed = entry.tx.receiver_count() > 0;
    if let Some(superseded) = entry.detach_fetch() {
      superseded.abort();
    }

    if entry.value.is_some() {
      entry.status = FetchStatus::Stale;
    }

    if observed && entry.fetcher.is_some() {
      debug!(key = %key, "refetching invalidated entry");
      self.start_fetch(key, entry);
    } else {
      entry.notify();
    }
  }

  /// Abort any in-progress read of `key` and wait until it has stopped.
  /// Its result, if it still arrives, is discarded.
  pub async fn cancel_in_flight(&self, key: QueryKey) {
    let handle = {
      let mut entries = self.lock();
      let Some(entry) = entries.get_mut(&key) else {
        return;
      };
      let Some(handle) = entry.detach_fetch() else {
        return;
      };
      entry.notify();
      handle
    };

    debug!(key = %key, "cancelling in-flight fetch");
    handle.abort();
    if let Err(err) = handle.await {
      if !err.is_cancelled() {
        warn!(key = %key, "fetch task failed while cancelling: {}", err);
      }
    }
  }

  /// Read `key`, fetching it with `fetcher` unless the entry is fresh.
  ///
  /// Fresh data is never refetched on time alone; only invalidation makes
  /// it stale. Concurrent readers share one in-flight fetch. A failed fetch
  /// leaves the cached value unchanged. A read whose fetch is cancelled
  /// returns the value current at that point, or `Cancelled` if there is
  /// none.
  pub async fn fetch(&self, key: QueryKey, fetcher: Fetcher<V>) -> Result<V, SyncError> {
    let mut rx = {
      let mut entries = self.lock();
      let entry = entries.entry(key).or_insert_with(Entry::new);
      entry.fetcher = Some(fetcher);

      if entry.status == FetchStatus::Fresh {
        if let Some(value) = &entry.value {
          return Ok(value.clone());
        }
      }

      let rx = entry.tx.subscribe();
      if entry.in_flight.is_none() {
        self.start_fetch(key, entry);
      }
      rx
    };

    let view = match rx.wait_for(|view| !view.is_fetching()).await {
      Ok(view) => view.clone(),
      Err(_) => return Err(SyncError::Cancelled { key }),
    };

    if let Some(err) = view.error {
      return Err(err);
    }
    view.value.ok_or(SyncError::Cancelled { key })
  }

  /// Abort every in-flight fetch. Cached values stay readable.
  pub fn shutdown(&self) {
    let mut entries = self.lock();
    for (key, entry) in entries.iter_mut() {
      if let Some(handle) = entry.detach_fetch() {
        debug!(key = %key, "aborting fetch on shutdown");
        handle.abort();
        entry.notify();
      }
    }
  }

  fn start_fetch(&self, key: QueryKey, entry: &mut Entry<V>) {
    let Some(fetcher) = entry.fetcher.clone() else {
      return;
    };
    let Ok(runtime) = Handle::try_current() else {
      debug!(key = %key, "no runtime to refetch on, entry left stale");
      entry.notify();
      return;
    };

    entry.generation += 1;
    let generation = entry.generation;
    entry.status = FetchStatus::Fetching;
    entry.error = None;
    entry.notify();

    let store = self.clone();
    let future = fetcher();
    entry.in_flight = Some(runtime.spawn(async move {
      let result = future.await;
      store.complete_fetch(key, generation, result);
    }));
  }

  fn complete_fetch(&self, key: QueryKey, generation: u64, result: Result<V, SyncError>) {
    let mut entries = self.lock();
    let Some(entry) = entries.get_mut(&key) else {
      return;
    };

    if entry.generation != generation {
      debug!(key = %key, generation, "discarding superseded fetch result");
      return;
    }

    entry.in_flight = None;
    match result {
      Ok(value) => {
        entry.value = Some(value);
        entry.status = FetchStatus::Fresh;
        entry.updated_at = Some(Utc::now());
        entry.error = None;
      }
      Err(err) => {
        warn!(key = %key, "fetch failed: {}", err);
        entry.status = FetchStatus::Invalid;
        entry.error = Some(err);
      }
    }
    entry.notify();
  }
}
