//! The task list query and the mutations a UI issues against it.
//!
//! `TaskSync` is the handle a UI holds: it reads the task list through the
//! cache, exposes the entry to observers, and starts mutations.
//!
//! # Example
//!
//! ```ignore
//! let store = CacheStore::new();
//! let sync = TaskSync::new(store, Arc::new(HttpTaskClient::new(&config)?), MutationMode::Optimistic);
//!
//! let mut tasks = sync.subscribe();
//! sync.read().await?;
//!
//! // Shows up in `tasks` right away, rolled back if the server refuses it
//! sync.create(CreateTaskInput::new("write docs")).await?;
//! ```

use std::sync::Arc;
use tokio::sync::watch;

use crate::cache::{fetcher, CacheStore, CacheView, Fetcher, QueryKey};
use crate::error::SyncError;
use crate::mutation::{
  CreateTask, DeleteTask, MutationHandle, MutationMode, MutationRunner, UpdateTaskStatus,
};
use crate::remote::TaskRemote;
use crate::task::{CreateTaskInput, Task, TaskId, TaskStatus};

const KEY: QueryKey = QueryKey::AllTasks;

/// Cached access to the remote task list.
pub struct TaskSync<R> {
  store: CacheStore<Vec<Task>>,
  remote: Arc<R>,
  runner: MutationRunner<R>,
}

impl<R> Clone for TaskSync<R> {
  fn clone(&self) -> Self {
    Self {
      store: self.store.clone(),
      remote: Arc::clone(&self.remote),
      runner: self.runner.clone(),
    }
  }
}

impl<R: TaskRemote> TaskSync<R> {
  pub fn new(store: CacheStore<Vec<Task>>, remote: Arc<R>, mode: MutationMode) -> Self {
    let runner = MutationRunner::new(store.clone(), Arc::clone(&remote), KEY, mode);
    Self {
      store,
      remote,
      runner,
    }
  }

  pub fn store(&self) -> &CacheStore<Vec<Task>> {
    &self.store
  }

  pub fn mode(&self) -> MutationMode {
    self.runner.mode()
  }

  fn list_fetcher(&self) -> Fetcher<Vec<Task>> {
    let remote = Arc::clone(&self.remote);
    fetcher(move || {
      let remote = Arc::clone(&remote);
      async move { remote.list().await }
    })
  }

  /// The task list, from cache when fresh, otherwise fetched.
  ///
  /// Once fetched the list stays fresh until a mutation settles.
  pub async fn read(&self) -> Result<Vec<Task>, SyncError> {
    self.store.fetch(KEY, self.list_fetcher()).await
  }

  /// The cached list without fetching.
  pub fn cached(&self) -> Option<Vec<Task>> {
    self.store.get(KEY)
  }

  /// Observe the task list. While the receiver is alive, settled mutations
  /// trigger a background refetch.
  pub fn subscribe(&self) -> watch::Receiver<CacheView<Vec<Task>>> {
    let rx = self.store.subscribe(KEY);
    self.store.register(KEY, self.list_fetcher());
    rx
  }

  pub fn spawn_create(&self, input: CreateTaskInput) -> MutationHandle<Task> {
    self.runner.spawn(CreateTask::new(input))
  }

  pub fn spawn_update_status(&self, id: TaskId, status: TaskStatus) -> MutationHandle<Task> {
    self.runner.spawn(UpdateTaskStatus::new(id, status))
  }

  pub fn spawn_delete(&self, id: TaskId) -> MutationHandle<()> {
    self.runner.spawn(DeleteTask::new(id))
  }

  pub async fn create(&self, input: CreateTaskInput) -> Result<Task, SyncError> {
    self.spawn_create(input).outcome().await
  }

  pub async fn update_status(&self, id: TaskId, status: TaskStatus) -> Result<Task, SyncError> {
    self.spawn_update_status(id, status).outcome().await
  }

  pub async fn delete(&self, id: TaskId) -> Result<(), SyncError> {
    self.spawn_delete(id).outcome().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::FetchStatus;
  use crate::error::Operation;
  use crate::mutation::MutationPhase;
  use crate::testing::{task, FakeRemote};

  fn sync(remote: &Arc<FakeRemote>, mode: MutationMode) -> TaskSync<FakeRemote> {
    TaskSync::new(CacheStore::new(), Arc::clone(remote), mode)
  }

  async fn next_fresh(rx: &mut watch::Receiver<CacheView<Vec<Task>>>) -> Vec<Task> {
    rx.wait_for(|view| view.is_fresh())
      .await
      .unwrap()
      .value
      .clone()
      .unwrap()
  }

  #[tokio::test]
  async fn test_read_is_fresh_until_invalidated() {
    let remote = FakeRemote::new(vec![task("1", TaskStatus::NotStarted)]);
    let sync = sync(&remote, MutationMode::Optimistic);

    assert_eq!(sync.read().await.unwrap().len(), 1);
    assert_eq!(sync.read().await.unwrap().len(), 1);
    assert_eq!(remote.list_calls(), 1);
  }

  #[tokio::test]
  async fn test_read_failure_leaves_cache_unchanged() {
    let remote = FakeRemote::new(vec![]);
    remote.fail(Operation::List);
    let sync = sync(&remote, MutationMode::Optimistic);

    let err = sync.read().await.unwrap_err();

    assert_eq!(err.operation(), Some(Operation::List));
    assert_eq!(sync.cached(), None);
  }

  #[tokio::test]
  async fn test_update_visible_then_rolled_back() {
    let remote = FakeRemote::gated(vec![task("1", TaskStatus::InProgress)]);
    remote.fail(Operation::UpdateStatus);
    let sync = sync(&remote, MutationMode::Optimistic);
    let before = sync.read().await.unwrap();

    let mut handle = sync.spawn_update_status("1".into(), TaskStatus::Completed);
    handle.wait_for(MutationPhase::Optimistic).await;

    let predicted = sync.cached().unwrap();
    assert_eq!(predicted.len(), 1);
    assert_eq!(predicted[0].status, TaskStatus::Completed);
    assert!(predicted[0].completed);

    remote.release(1);
    let err = handle.outcome().await.unwrap_err();

    assert_eq!(err.operation(), Some(Operation::UpdateStatus));
    assert_eq!(sync.cached(), Some(before.clone()));
    assert_eq!(sync.cached().unwrap()[0].status, TaskStatus::InProgress);
    assert!(!sync.cached().unwrap()[0].completed);
  }

  #[tokio::test]
  async fn test_rollback_restores_exact_sequence() {
    let remote = FakeRemote::new(vec![
      task("a", TaskStatus::NotStarted),
      task("b", TaskStatus::Completed),
      task("c", TaskStatus::InProgress),
    ]);
    remote.fail(Operation::Create);
    remote.fail(Operation::Delete);
    let sync = sync(&remote, MutationMode::Optimistic);
    let before = sync.read().await.unwrap();

    assert!(sync.create(CreateTaskInput::new("x")).await.is_err());
    assert_eq!(sync.cached(), Some(before.clone()));

    assert!(sync.delete("b".into()).await.is_err());
    assert_eq!(sync.cached(), Some(before));
  }

  #[tokio::test]
  async fn test_create_converges_to_server_identity() {
    let remote = FakeRemote::gated(vec![]);
    let sync = sync(&remote, MutationMode::Optimistic);
    let mut rx = sync.subscribe();
    assert_eq!(sync.read().await.unwrap(), vec![]);

    let mut handle = sync.spawn_create(CreateTaskInput::new("x"));
    handle.wait_for(MutationPhase::Optimistic).await;

    let predicted = sync.cached().unwrap();
    assert_eq!(predicted.len(), 1);
    assert_eq!(predicted[0].title, "x");
    assert_eq!(predicted[0].status, TaskStatus::InProgress);
    assert_ne!(predicted[0].id.as_str(), "server-1");

    remote.release(1);
    let created = handle.outcome().await.unwrap();
    assert_eq!(created.id.as_str(), "server-1");

    let settled = next_fresh(&mut rx).await;
    assert_eq!(settled, remote.tasks());
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].id.as_str(), "server-1");
    assert_eq!(remote.list_calls(), 2);
  }

  #[tokio::test]
  async fn test_failed_mutation_converges_after_refetch() {
    let remote = FakeRemote::new(vec![task("1", TaskStatus::InProgress)]);
    remote.fail(Operation::UpdateStatus);
    let sync = sync(&remote, MutationMode::Optimistic);
    let mut rx = sync.subscribe();
    sync.read().await.unwrap();

    assert!(sync
      .update_status("1".into(), TaskStatus::Completed)
      .await
      .is_err());

    assert_eq!(next_fresh(&mut rx).await, remote.tasks());
    assert_eq!(remote.list_calls(), 2);
  }

  #[tokio::test]
  async fn test_completion_picks_up_server_end_date() {
    let remote = FakeRemote::new(vec![task("1", TaskStatus::InProgress)]);
    let sync = sync(&remote, MutationMode::Optimistic);
    let mut rx = sync.subscribe();
    sync.read().await.unwrap();

    let updated = sync
      .update_status("1".into(), TaskStatus::Completed)
      .await
      .unwrap();
    assert!(updated.end_date.is_some());

    let settled = next_fresh(&mut rx).await;
    assert!(settled[0].completed);
    assert_eq!(settled[0].end_date, updated.end_date);
  }

  #[tokio::test]
  async fn test_interleaved_mutations_on_disjoint_ids() {
    let remote = FakeRemote::gated(vec![
      task("a", TaskStatus::NotStarted),
      task("b", TaskStatus::NotStarted),
    ]);
    let sync = sync(&remote, MutationMode::Optimistic);
    let mut rx = sync.subscribe();
    sync.read().await.unwrap();

    let mut update = sync.spawn_update_status("a".into(), TaskStatus::InProgress);
    update.wait_for(MutationPhase::Optimistic).await;
    let mut delete = sync.spawn_delete("b".into());
    delete.wait_for(MutationPhase::Optimistic).await;

    let predicted = sync.cached().unwrap();
    assert_eq!(predicted.len(), 1);
    assert_eq!(predicted[0].status, TaskStatus::InProgress);

    remote.release(2);
    update.outcome().await.unwrap();
    delete.outcome().await.unwrap();

    let settled = next_fresh(&mut rx).await;
    assert_eq!(settled, remote.tasks());
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].id.as_str(), "a");
    assert_eq!(settled[0].status, TaskStatus::InProgress);
  }

  #[tokio::test]
  async fn test_interleaved_mutations_in_reverse_order() {
    let remote = FakeRemote::gated(vec![
      task("a", TaskStatus::NotStarted),
      task("b", TaskStatus::NotStarted),
    ]);
    let sync = sync(&remote, MutationMode::Optimistic);
    let mut rx = sync.subscribe();
    sync.read().await.unwrap();

    let mut delete = sync.spawn_delete("b".into());
    delete.wait_for(MutationPhase::Optimistic).await;
    let mut update = sync.spawn_update_status("a".into(), TaskStatus::InProgress);
    update.wait_for(MutationPhase::Optimistic).await;

    let predicted = sync.cached().unwrap();
    assert_eq!(predicted.len(), 1);
    assert_eq!(predicted[0].id.as_str(), "a");
    assert_eq!(predicted[0].status, TaskStatus::InProgress);

    remote.release(2);
    delete.outcome().await.unwrap();
    update.outcome().await.unwrap();

    let settled = next_fresh(&mut rx).await;
    assert_eq!(settled, remote.tasks());
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].status, TaskStatus::InProgress);
  }

  #[tokio::test]
  async fn test_interleaved_failure_restores_only_its_snapshot() {
    let remote = FakeRemote::gated(vec![
      task("a", TaskStatus::NotStarted),
      task("b", TaskStatus::NotStarted),
    ]);
    remote.fail(Operation::UpdateStatus);
    let sync = sync(&remote, MutationMode::Optimistic);
    let mut rx = sync.subscribe();
    let before = sync.read().await.unwrap();

    // The gate hands out permits in arrival order: the update resolves first.
    let mut update = sync.spawn_update_status("a".into(), TaskStatus::Completed);
    update.wait_for(MutationPhase::Optimistic).await;
    let mut delete = sync.spawn_delete("b".into());
    delete.wait_for(MutationPhase::Optimistic).await;
    assert_eq!(sync.cached().unwrap().len(), 1);

    remote.release(1);
    let err = update.outcome().await.unwrap_err();
    assert_eq!(err.operation(), Some(Operation::UpdateStatus));
    // The update's snapshot predates the delete's prediction.
    assert_eq!(sync.cached(), Some(before));
    assert_eq!(delete.phase(), MutationPhase::Optimistic);

    remote.release(1);
    delete.outcome().await.unwrap();

    let settled = next_fresh(&mut rx).await;
    assert_eq!(settled, remote.tasks());
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].id.as_str(), "a");
    assert_eq!(settled[0].status, TaskStatus::NotStarted);
  }

  #[tokio::test]
  async fn test_delete_of_absent_id_does_not_crash() {
    let remote = FakeRemote::gated(vec![task("1", TaskStatus::InProgress)]);
    let sync = sync(&remote, MutationMode::Optimistic);
    let before = sync.read().await.unwrap();

    let mut handle = sync.spawn_delete("missing".into());
    handle.wait_for(MutationPhase::Optimistic).await;
    assert_eq!(sync.cached(), Some(before.clone()));

    remote.release(1);
    let err = handle.outcome().await.unwrap_err();

    assert_eq!(err.operation(), Some(Operation::Delete));
    assert_eq!(sync.cached(), Some(before));
  }

  #[tokio::test]
  async fn test_unobserved_settle_refetches_on_next_read() {
    let remote = FakeRemote::new(vec![]);
    let sync = sync(&remote, MutationMode::Optimistic);
    sync.read().await.unwrap();

    sync.create(CreateTaskInput::new("x")).await.unwrap();

    assert_eq!(sync.store().view(KEY).status, FetchStatus::Stale);
    assert_eq!(remote.list_calls(), 1);
    let tasks = sync.read().await.unwrap();
    assert_eq!(tasks, remote.tasks());
    assert_eq!(remote.list_calls(), 2);
  }

  #[tokio::test]
  async fn test_mutation_cancels_in_flight_read() {
    let remote = FakeRemote::fully_gated(vec![task("1", TaskStatus::InProgress)]);
    let sync = sync(&remote, MutationMode::Optimistic);
    sync.store().set(KEY, remote.tasks());
    sync.store().invalidate(KEY);
    let mut rx = sync.subscribe();

    // A slow read is started, then overtaken by a mutation
    let reader = {
      let sync = sync.clone();
      tokio::spawn(async move { sync.read().await })
    };
    rx.wait_for(|view| view.is_fetching()).await.unwrap();

    let mut handle = sync.spawn_delete("1".into());
    handle.wait_for(MutationPhase::Optimistic).await;
    assert_eq!(sync.cached(), Some(vec![]));

    remote.release(1);
    handle.outcome().await.unwrap();
    remote.release_reads(1);

    assert!(reader.await.unwrap().is_ok());
    assert_eq!(next_fresh(&mut rx).await, vec![]);
  }

  #[tokio::test]
  async fn test_pessimistic_mode_waits_for_server() {
    let remote = FakeRemote::gated(vec![]);
    let sync = sync(&remote, MutationMode::Pessimistic);
    sync.read().await.unwrap();

    let mut handle = sync.spawn_create(CreateTaskInput::new("x"));
    tokio::task::yield_now().await;
    assert_eq!(handle.phase(), MutationPhase::Idle);
    assert_eq!(sync.cached(), Some(vec![]));

    remote.release(1);
    assert_eq!(handle.wait_for(MutationPhase::Settled).await, MutationPhase::Settled);
    let created = handle.outcome().await.unwrap();

    assert_eq!(sync.cached(), Some(vec![created]));
  }

  #[tokio::test]
  async fn test_pessimistic_failure_leaves_cache() {
    let remote = FakeRemote::new(vec![task("1", TaskStatus::InProgress)]);
    remote.fail(Operation::Delete);
    let sync = sync(&remote, MutationMode::Pessimistic);
    let before = sync.read().await.unwrap();

    assert!(sync.delete("1".into()).await.is_err());
    assert_eq!(sync.cached(), Some(before));
  }
}
