use std::fmt;

/// Identity of a cached query.
///
/// An enum rather than a string so two queries can only share an entry if
/// they are the same variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
  /// The full task list (`GET /`)
  AllTasks,
}

impl QueryKey {
  /// Human-readable description of the query.
  pub fn description(&self) -> &'static str {
    match self {
      Self::AllTasks => "all tasks",
    }
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::AllTasks => f.write_str("tasks:all"),
    }
  }
}
