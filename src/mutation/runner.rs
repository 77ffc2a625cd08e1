//! Drives a [`Mutation`] through its phases on its own task.

use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::context::MutationContext;
use super::protocol::Mutation;
use super::reconciler::Reconciler;
use crate::cache::{CacheStore, QueryKey};
use crate::error::{Operation, SyncError};
use crate::remote::TaskRemote;
use crate::task::Task;

/// How writes reach the cache.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MutationMode {
  /// Predict, call the server, then commit or roll back
  #[default]
  Optimistic,
  /// Touch the cache only once the server has answered
  Pessimistic,
}

/// Where a mutation is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
  Idle,
  /// Predicted value is in the cache, remote call pending
  Optimistic,
  /// Server answered; its value is in the cache
  Committed,
  /// Remote call failed; snapshot restored
  RolledBack,
  /// Key invalidated; the mutation is done
  Settled,
}

impl MutationPhase {
  fn rank(self) -> u8 {
    match self {
      Self::Idle => 0,
      Self::Optimistic => 1,
      Self::Committed | Self::RolledBack => 2,
      Self::Settled => 3,
    }
  }

  /// Whether this phase is at or past `target`. `Committed` and
  /// `RolledBack` count as the same step.
  pub fn has_reached(self, target: MutationPhase) -> bool {
    self.rank() >= target.rank()
  }
}

/// Runs mutations against a cache key and a remote.
pub struct MutationRunner<R> {
  store: CacheStore<Vec<Task>>,
  remote: Arc<R>,
  reconciler: Reconciler<Vec<Task>>,
  mode: MutationMode,
  key: QueryKey,
}

impl<R> Clone for MutationRunner<R> {
  fn clone(&self) -> Self {
    Self {
      store: self.store.clone(),
      remote: Arc::clone(&self.remote),
      reconciler: self.reconciler.clone(),
      mode: self.mode,
      key: self.key,
    }
  }
}

impl<R: TaskRemote> MutationRunner<R> {
  pub fn new(
    store: CacheStore<Vec<Task>>,
    remote: Arc<R>,
    key: QueryKey,
    mode: MutationMode,
  ) -> Self {
    let reconciler = Reconciler::new(store.clone());
    Self {
      store,
      remote,
      reconciler,
      mode,
      key,
    }
  }

  pub fn mode(&self) -> MutationMode {
    self.mode
  }

  /// Run `mutation` on a new task.
  pub fn spawn<M: Mutation>(&self, mutation: M) -> MutationHandle<M::Output> {
    let (tx, rx) = watch::channel(MutationPhase::Idle);
    let operation = mutation.operation();
    let runner = self.clone();
    let task = tokio::spawn(async move { runner.run(mutation, &tx).await });

    MutationHandle {
      operation,
      phase: rx,
      task,
    }
  }

  /// Run `mutation` to settlement, reporting phases on `phase`.
  ///
  /// The remote failure, if any, is returned after the cache has been
  /// rolled back and the key invalidated.
  pub async fn run<M: Mutation>(
    &self,
    mutation: M,
    phase: &watch::Sender<MutationPhase>,
  ) -> Result<M::Output, SyncError> {
    let operation = mutation.operation();

    let context = match self.mode {
      MutationMode::Optimistic => {
        let context = MutationContext::begin(&self.store, self.key).await;
        self
          .store
          .update(self.key, |current| mutation.predict(current));
        transition(phase, operation, MutationPhase::Optimistic);
        Some(context)
      }
      MutationMode::Pessimistic => None,
    };

    let result = mutation.execute(self.remote.as_ref()).await;

    match &result {
      Ok(output) => {
        self
          .store
          .update(self.key, |current| mutation.commit(current, output));
        transition(phase, operation, MutationPhase::Committed);
      }
      Err(err) => {
        warn!(operation = %operation, "mutation failed, rolling back: {}", err);
        if let Some(context) = context {
          context.restore(&self.store);
        }
        transition(phase, operation, MutationPhase::RolledBack);
      }
    }

    self.reconciler.settle(self.key);
    transition(phase, operation, MutationPhase::Settled);

    result
  }
}

fn transition(phase: &watch::Sender<MutationPhase>, operation: Operation, next: MutationPhase) {
  debug!(operation = %operation, phase = ?next, "mutation transition");
  phase.send_replace(next);
}

/// A mutation running on its own task.
///
/// Mutations cannot be cancelled; dropping the handle lets it run to
/// settlement in the background.
pub struct MutationHandle<T> {
  operation: Operation,
  phase: watch::Receiver<MutationPhase>,
  task: JoinHandle<Result<T, SyncError>>,
}

impl<T> MutationHandle<T> {
  pub fn operation(&self) -> Operation {
    self.operation
  }

  pub fn phase(&self) -> MutationPhase {
    *self.phase.borrow()
  }

  /// Wait until the mutation has reached `target` (see
  /// [`MutationPhase::has_reached`]) and return the phase it is in.
  pub async fn wait_for(&mut self, target: MutationPhase) -> MutationPhase {
    let reached = self
      .phase
      .wait_for(|phase| phase.has_reached(target))
      .await
      .map(|phase| *phase);
    reached.unwrap_or_else(|_| *self.phase.borrow())
  }

  /// Wait for the mutation to settle and return its result.
  pub async fn outcome(self) -> Result<T, SyncError> {
    let operation = self.operation;
    self.task.await.unwrap_or_else(|e| {
      Err(SyncError::Interrupted {
        operation,
        message: e.to_string(),
      })
    })
  }
}
