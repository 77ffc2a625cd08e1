//! Remote CRUD operations on the task collection.

mod client;

use std::future::Future;

use crate::error::SyncError;
use crate::task::{CreateTaskInput, Task, TaskId, TaskStatus};

pub use client::HttpTaskClient;

/// The four remote operations the sync layer depends on.
///
/// Each either returns canonical server data or fails with a
/// [`SyncError`] naming the operation.
pub trait TaskRemote: Send + Sync + 'static {
  /// `GET /`
  fn list(&self) -> impl Future<Output = Result<Vec<Task>, SyncError>> + Send;

  /// `POST /`
  fn create(&self, input: &CreateTaskInput)
    -> impl Future<Output = Result<Task, SyncError>> + Send;

  /// `PATCH /{id}/status`
  fn update_status(
    &self,
    id: &TaskId,
    status: TaskStatus,
  ) -> impl Future<Output = Result<Task, SyncError>> + Send;

  /// `DELETE /{id}`
  fn delete(&self, id: &TaskId) -> impl Future<Output = Result<(), SyncError>> + Send;
}
