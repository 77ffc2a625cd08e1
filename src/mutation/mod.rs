//! Optimistic mutations of cached query data.
//!
//! A mutation snapshots the cache, writes a predicted value, runs the remote
//! call, then either commits the server's answer or restores the snapshot.
//! Either way it settles by invalidating the key so the next observation is
//! refetched from the server.

mod context;
mod protocol;
mod reconciler;
mod runner;

pub use context::MutationContext;
pub use protocol::{CreateTask, DeleteTask, Mutation, UpdateTaskStatus};
pub use reconciler::Reconciler;
pub use runner::{MutationHandle, MutationMode, MutationPhase, MutationRunner};
