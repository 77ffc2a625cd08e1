use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque unique task identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  /// A locally generated identity for an optimistic record.
  pub fn local() -> Self {
    Self(uuid::Uuid::new_v4().to_string())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for TaskId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for TaskId {
  fn from(id: &str) -> Self {
    Self::new(id)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
  NotStarted,
  InProgress,
  Completed,
}

impl TaskStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      TaskStatus::NotStarted => "not-started",
      TaskStatus::InProgress => "in-progress",
      TaskStatus::Completed => "completed",
    }
  }

  pub fn is_completed(&self) -> bool {
    matches!(self, TaskStatus::Completed)
  }
}

impl fmt::Display for TaskStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for TaskStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "not-started" => Ok(TaskStatus::NotStarted),
      "in-progress" => Ok(TaskStatus::InProgress),
      "completed" => Ok(TaskStatus::Completed),
      other => Err(format!(
        "unknown status '{}' (expected not-started, in-progress or completed)",
        other
      )),
    }
  }
}

/// A task record in its canonical JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  pub id: TaskId,
  pub title: String,
  pub status: TaskStatus,
  pub completed: bool,
  pub created: DateTime<Utc>,
  pub end_date: Option<DateTime<Utc>>,
}

impl Task {
  /// The record predicted for a create before the server has answered.
  pub fn predicted(input: &CreateTaskInput) -> Self {
    Self {
      id: TaskId::local(),
      title: input.title.clone(),
      status: TaskStatus::InProgress,
      completed: false,
      created: Utc::now(),
      end_date: None,
    }
  }

  /// Copy of this record with `status` replaced and `completed` recomputed.
  ///
  /// `end_date` is left alone; the server computes it.
  pub fn with_status(&self, status: TaskStatus) -> Self {
    Self {
      status,
      completed: status.is_completed(),
      ..self.clone()
    }
  }

  /// Whether `completed` agrees with `status`.
  pub fn is_consistent(&self) -> bool {
    self.completed == self.status.is_completed()
  }
}

/// Caller-supplied fields for a new task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTaskInput {
  pub title: String,
}

impl CreateTaskInput {
  pub fn new(title: impl Into<String>) -> Self {
    Self {
      title: title.into(),
    }
  }
}

/// Body of `PATCH /{id}/status`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StatusPatch {
  pub status: TaskStatus,
}
