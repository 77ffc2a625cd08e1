//! In-memory stand-in for the task service, used by tests.

use chrono::{TimeZone, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

use crate::error::{Operation, SyncError};
use crate::remote::TaskRemote;
use crate::task::{CreateTaskInput, Task, TaskId, TaskStatus};

/// A task with a fixed creation time.
pub(crate) fn task(id: &str, status: TaskStatus) -> Task {
  Task {
    id: TaskId::new(id),
    title: format!("task {}", id),
    status,
    completed: status.is_completed(),
    created: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
    end_date: None,
  }
}

#[derive(Default)]
struct ServerState {
  tasks: Vec<Task>,
  next_id: u32,
  failing: HashSet<Operation>,
}

/// Fake server. When gated, every mutation waits for a permit from
/// [`FakeRemote::release`] before it takes effect, and with gated reads
/// every list waits for [`FakeRemote::release_reads`].
pub(crate) struct FakeRemote {
  state: Mutex<ServerState>,
  gate: Option<Semaphore>,
  read_gate: Option<Semaphore>,
  list_calls: AtomicUsize,
}

impl FakeRemote {
  pub(crate) fn new(tasks: Vec<Task>) -> Arc<Self> {
    Arc::new(Self::build(tasks, None, None))
  }

  pub(crate) fn gated(tasks: Vec<Task>) -> Arc<Self> {
    Arc::new(Self::build(tasks, Some(Semaphore::new(0)), None))
  }

  /// Gate both mutations and reads.
  pub(crate) fn fully_gated(tasks: Vec<Task>) -> Arc<Self> {
    Arc::new(Self::build(
      tasks,
      Some(Semaphore::new(0)),
      Some(Semaphore::new(0)),
    ))
  }

  fn build(tasks: Vec<Task>, gate: Option<Semaphore>, read_gate: Option<Semaphore>) -> Self {
    Self {
      state: Mutex::new(ServerState {
        tasks,
        ..ServerState::default()
      }),
      gate,
      read_gate,
      list_calls: AtomicUsize::new(0),
    }
  }

  /// Let `n` pending mutations proceed.
  pub(crate) fn release(&self, n: usize) {
    if let Some(gate) = &self.gate {
      gate.add_permits(n);
    }
  }

  /// Let `n` pending reads proceed.
  pub(crate) fn release_reads(&self, n: usize) {
    if let Some(gate) = &self.read_gate {
      gate.add_permits(n);
    }
  }

  /// Make every later call of `operation` fail.
  pub(crate) fn fail(&self, operation: Operation) {
    self.state.lock().unwrap().failing.insert(operation);
  }

  pub(crate) fn tasks(&self) -> Vec<Task> {
    self.state.lock().unwrap().tasks.clone()
  }

  pub(crate) fn list_calls(&self) -> usize {
    self.list_calls.load(Ordering::SeqCst)
  }

  async fn pass_gate(&self, operation: Operation) -> Result<(), SyncError> {
    if let Some(gate) = &self.gate {
      gate
        .acquire()
        .await
        .map_err(|e| SyncError::remote(operation, e.to_string()))?
        .forget();
    }
    if self.state.lock().unwrap().failing.contains(&operation) {
      return Err(SyncError::remote(operation, "500 Internal Server Error"));
    }
    Ok(())
  }
}

impl TaskRemote for FakeRemote {
  async fn list(&self) -> Result<Vec<Task>, SyncError> {
    self.list_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(gate) = &self.read_gate {
      gate
        .acquire()
        .await
        .map_err(|e| SyncError::remote(Operation::List, e.to_string()))?
        .forget();
    }
    let state = self.state.lock().unwrap();
    if state.failing.contains(&Operation::List) {
      return Err(SyncError::remote(Operation::List, "503 Service Unavailable"));
    }
    Ok(state.tasks.clone())
  }

  async fn create(&self, input: &CreateTaskInput) -> Result<Task, SyncError> {
    self.pass_gate(Operation::Create).await?;
    let mut state = self.state.lock().unwrap();
    state.next_id += 1;
    let created = Task {
      id: TaskId::new(format!("server-{}", state.next_id)),
      title: input.title.clone(),
      status: TaskStatus::InProgress,
      completed: false,
      created: Utc::now(),
      end_date: None,
    };
    state.tasks.push(created.clone());
    Ok(created)
  }

  async fn update_status(&self, id: &TaskId, status: TaskStatus) -> Result<Task, SyncError> {
    self.pass_gate(Operation::UpdateStatus).await?;
    let mut state = self.state.lock().unwrap();
    let task = state
      .tasks
      .iter_mut()
      .find(|task| &task.id == id)
      .ok_or_else(|| SyncError::remote(Operation::UpdateStatus, "404 Not Found"))?;
    *task = task.with_status(status);
    task.end_date = status.is_completed().then(Utc::now);
    Ok(task.clone())
  }

  async fn delete(&self, id: &TaskId) -> Result<(), SyncError> {
    self.pass_gate(Operation::Delete).await?;
    let mut state = self.state.lock().unwrap();
    let before = state.tasks.len();
    state.tasks.retain(|task| &task.id != id);
    if state.tasks.len() == before {
      return Err(SyncError::remote(Operation::Delete, "404 Not Found"));
    }
    Ok(())
  }
}
