//! Client-side synchronization layer for a remote task collection.
//!
//! The crate keeps an in-memory cache of the remote task list and lets a UI
//! mutate it optimistically: predicted values are written before the remote
//! call resolves, rolled back on failure, and reconciled with server truth
//! once every mutation settles.

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod mutation;
pub mod query;
pub mod remote;
pub mod task;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheStore, CacheView, FetchStatus, QueryKey};
pub use error::{Operation, SyncError};
pub use mutation::{MutationHandle, MutationMode, MutationPhase};
pub use query::TaskSync;
pub use remote::{HttpTaskClient, TaskRemote};
pub use task::{CreateTaskInput, Task, TaskId, TaskStatus};
