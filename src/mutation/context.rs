use crate::cache::{CacheStore, QueryKey};

/// Cache state captured by one mutation before its optimistic write.
///
/// Owned by exactly one mutation invocation. The snapshot is never modified;
/// `restore` consumes the context so it can be read at most once.
#[derive(Debug)]
pub struct MutationContext<V> {
  key: QueryKey,
  snapshot: Option<V>,
}

impl<V: Clone + Send + Sync + 'static> MutationContext<V> {
  /// Cancel any in-flight read of `key`, then capture its current value.
  pub async fn begin(store: &CacheStore<V>, key: QueryKey) -> Self {
    store.cancel_in_flight(key).await;
    Self {
      key,
      snapshot: store.get(key),
    }
  }

  pub fn snapshot(&self) -> Option<&V> {
    self.snapshot.as_ref()
  }

  /// Put the captured value back, replacing whatever is cached now.
  pub fn restore(self, store: &CacheStore<V>) {
    store.restore(self.key, self.snapshot);
  }
}
