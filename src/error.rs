//! Error types surfaced to callers of reads and mutations.

use std::fmt;

use crate::cache::QueryKey;

/// The remote operation a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
  List,
  Create,
  UpdateStatus,
  Delete,
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Operation::List => "list",
      Operation::Create => "create",
      Operation::UpdateStatus => "update-status",
      Operation::Delete => "delete",
    };
    f.write_str(name)
  }
}

/// Failures of the sync layer.
///
/// Cloneable so a single fetch failure can be handed to every observer
/// waiting on the same cache entry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
  /// Network error or non-success response.
  #[error("{operation} failed: {message}")]
  Remote { operation: Operation, message: String },

  /// The server answered, but the body was not a valid task payload.
  #[error("{operation} returned an invalid payload: {message}")]
  Decode { operation: Operation, message: String },

  /// A read was superseded before it produced a value.
  #[error("fetch of {key} was cancelled")]
  Cancelled { key: QueryKey },

  /// The task driving a mutation ended without reporting an outcome.
  #[error("{operation} ended unexpectedly: {message}")]
  Interrupted { operation: Operation, message: String },
}

impl SyncError {
  pub fn remote(operation: Operation, message: impl Into<String>) -> Self {
    Self::Remote {
      operation,
      message: message.into(),
    }
  }

  /// The originating operation, if the failure came from one.
  pub fn operation(&self) -> Option<Operation> {
    match self {
      Self::Remote { operation, .. }
      | Self::Decode { operation, .. }
      | Self::Interrupted { operation, .. } => Some(*operation),
      Self::Cancelled { .. } => None,
    }
  }

  pub fn is_cancelled(&self) -> bool {
    matches!(self, Self::Cancelled { .. })
  }
}
