//! The three task mutations: what each predicts, executes and commits.

use std::future::Future;

use crate::error::{Operation, SyncError};
use crate::remote::TaskRemote;
use crate::task::{CreateTaskInput, Task, TaskId, TaskStatus};

/// A write against the task list.
///
/// `predict` and `commit` receive the cached list current at the time they
/// run and return its replacement; `None` leaves the cache untouched.
pub trait Mutation: Send + Sync + 'static {
  type Output: Send + 'static;

  fn operation(&self) -> Operation;

  /// The value to show before the server has answered.
  fn predict(&self, current: Option<&Vec<Task>>) -> Option<Vec<Task>>;

  fn execute<R: TaskRemote>(
    &self,
    remote: &R,
  ) -> impl Future<Output = Result<Self::Output, SyncError>> + Send;

  /// Fold the server's answer into the cached list.
  fn commit(&self, current: Option<&Vec<Task>>, output: &Self::Output) -> Option<Vec<Task>>;
}

/// Create a task.
#[derive(Debug, Clone)]
pub struct CreateTask {
  input: CreateTaskInput,
  /// Placeholder shown until the server record arrives
  predicted: Task,
}

impl CreateTask {
  pub fn new(input: CreateTaskInput) -> Self {
    let predicted = Task::predicted(&input);
    Self { input, predicted }
  }

  pub fn predicted(&self) -> &Task {
    &self.predicted
  }
}

impl Mutation for CreateTask {
  type Output = Task;

  fn operation(&self) -> Operation {
    Operation::Create
  }

  fn predict(&self, current: Option<&Vec<Task>>) -> Option<Vec<Task>> {
    let mut tasks = current.cloned().unwrap_or_default();
    tasks.push(self.predicted.clone());
    Some(tasks)
  }

  async fn execute<R: TaskRemote>(&self, remote: &R) -> Result<Task, SyncError> {
    remote.create(&self.input).await
  }

  fn commit(&self, current: Option<&Vec<Task>>, created: &Task) -> Option<Vec<Task>> {
    let mut tasks = current.cloned().unwrap_or_default();
    tasks.retain(|task| task.id != created.id);

    match tasks.iter().position(|task| task.id == self.predicted.id) {
      Some(index) => tasks[index] = created.clone(),
      None => tasks.push(created.clone()),
    }
    Some(tasks)
  }
}

/// Change a task's status.
#[derive(Debug, Clone)]
pub struct UpdateTaskStatus {
  pub id: TaskId,
  pub status: TaskStatus,
}

impl UpdateTaskStatus {
  pub fn new(id: TaskId, status: TaskStatus) -> Self {
    Self { id, status }
  }
}

impl Mutation for UpdateTaskStatus {
  type Output = Task;

  fn operation(&self) -> Operation {
    Operation::UpdateStatus
  }

  fn predict(&self, current: Option<&Vec<Task>>) -> Option<Vec<Task>> {
    current.map(|tasks| {
      tasks
        .iter()
        .map(|task| {
          if task.id == self.id {
            task.with_status(self.status)
          } else {
            task.clone()
          }
        })
        .collect()
    })
  }

  async fn execute<R: TaskRemote>(&self, remote: &R) -> Result<Task, SyncError> {
    remote.update_status(&self.id, self.status).await
  }

  fn commit(&self, current: Option<&Vec<Task>>, updated: &Task) -> Option<Vec<Task>> {
    current.map(|tasks| {
      tasks
        .iter()
        .map(|task| {
          if task.id == updated.id {
            updated.clone()
          } else {
            task.clone()
          }
        })
        .collect()
    })
  }
}

/// Delete a task.
#[derive(Debug, Clone)]
pub struct DeleteTask {
  pub id: TaskId,
}

impl DeleteTask {
  pub fn new(id: TaskId) -> Self {
    Self { id }
  }

  fn without_target(&self, tasks: &[Task]) -> Vec<Task> {
    tasks
      .iter()
      .filter(|task| task.id != self.id)
      .cloned()
      .collect()
  }
}

impl Mutation for DeleteTask {
  type Output = ();

  fn operation(&self) -> Operation {
    Operation::Delete
  }

  fn predict(&self, current: Option<&Vec<Task>>) -> Option<Vec<Task>> {
    current.map(|tasks| self.without_target(tasks))
  }

  async fn execute<R: TaskRemote>(&self, remote: &R) -> Result<(), SyncError> {
    remote.delete(&self.id).await
  }

  fn commit(&self, current: Option<&Vec<Task>>, _output: &()) -> Option<Vec<Task>> {
    // Only rewrite if the record is still there (pessimistic mode)
    current
      .filter(|tasks| tasks.iter().any(|task| task.id == self.id))
      .map(|tasks| self.without_target(tasks))
  }
}
