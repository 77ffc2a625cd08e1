//! Task records as the remote service and the cache see them.

mod types;

pub use types::{CreateTaskInput, StatusPatch, Task, TaskId, TaskStatus};
