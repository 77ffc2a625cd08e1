use tracing::debug;

use crate::cache::{CacheStore, QueryKey};

/// Heals the cache after a mutation settles by invalidating its key.
#[derive(Clone)]
pub struct Reconciler<V> {
  store: CacheStore<V>,
}

impl<V: Clone + Send + Sync + 'static> Reconciler<V> {
  pub fn new(store: CacheStore<V>) -> Self {
    Self { store }
  }

  /// Invalidate `key`; observed entries are refetched in the background.
  pub fn settle(&self, key: QueryKey) {
    debug!(key = %key, "reconciling {} after settled mutation", key.description());
    self.store.invalidate(key);
  }
}
