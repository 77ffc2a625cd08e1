//! What observers of a cache entry see.

use chrono::{DateTime, Utc};

use crate::error::SyncError;

/// Fetch state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
  /// Value is current; reads are served without a fetch
  Fresh,
  /// Value was invalidated and will be refetched on the next read
  Stale,
  /// A fetch is in flight
  Fetching,
  /// No usable value: never fetched, last fetch failed, or cleared
  Invalid,
}

/// Observable state of one cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheView<V> {
  pub value: Option<V>,
  pub status: FetchStatus,
  /// When the value was last written
  pub updated_at: Option<DateTime<Utc>>,
  /// Error from the last failed fetch, cleared by the next write or fetch
  pub error: Option<SyncError>,
}

impl<V> CacheView<V> {
  pub fn empty() -> Self {
    Self {
      value: None,
      status: FetchStatus::Invalid,
      updated_at: None,
      error: None,
    }
  }

  pub fn is_fresh(&self) -> bool {
    self.status == FetchStatus::Fresh
  }

  pub fn is_fetching(&self) -> bool {
    self.status == FetchStatus::Fetching
  }
}
