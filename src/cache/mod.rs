//! In-memory query cache shared by reads and mutations.
//!
//! This module provides a keyed store that:
//! - Holds one canonical value per query key, replaced as a whole
//! - Tracks fetch state (fresh, stale, fetching, invalid) per entry
//! - Notifies observers synchronously through `tokio::sync::watch`
//! - Lets mutations cancel in-flight reads so late responses are discarded

mod key;
mod store;
mod view;

pub use key::QueryKey;
pub use store::{fetcher, BoxFuture, CacheStore, Fetcher};
pub use view::{CacheView, FetchStatus};
