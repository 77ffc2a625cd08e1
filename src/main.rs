use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;

use tasksync::config::Config;
use tasksync::{
  logging, CacheStore, CreateTaskInput, HttpTaskClient, MutationMode, Task, TaskId, TaskStatus,
  TaskSync,
};

#[derive(Parser, Debug)]
#[command(name = "tasksync")]
#[command(about = "Read and change tasks on a remote task service")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/tasksync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Task service URL (overrides config and TASKSYNC_URL)
  #[arg(short, long)]
  url: Option<String>,

  /// Only update the local list after the server confirms a change
  #[arg(long)]
  pessimistic: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List all tasks
  List,
  /// Create a task
  Add { title: String },
  /// Set a task's status (not-started, in-progress, completed)
  Status { id: String, status: TaskStatus },
  /// Delete a task
  Delete { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;
  if let Some(url) = args.url {
    config.server.url = url;
  }
  if args.pessimistic {
    config.mutations.mode = MutationMode::Pessimistic;
  }

  let _log_guard = logging::init(&config)?;

  let remote = Arc::new(HttpTaskClient::new(&config)?);
  let store = CacheStore::new();
  let sync = TaskSync::new(store.clone(), remote, config.mutations.mode);

  let result = run(&sync, args.command).await;
  store.shutdown();
  result
}

async fn run(sync: &TaskSync<HttpTaskClient>, command: Command) -> Result<()> {
  // Mutations operate on the current list
  let tasks = sync.read().await?;

  match command {
    Command::List => {
      print_tasks(&tasks);
      return Ok(());
    }
    Command::Add { title } => {
      let task = sync.create(CreateTaskInput::new(title)).await?;
      println!("created {}", task.id);
    }
    Command::Status { id, status } => {
      let task = sync.update_status(TaskId::new(id), status).await?;
      println!("{} is now {}", task.id, task.status);
    }
    Command::Delete { id } => {
      let id = TaskId::new(id);
      sync.delete(id.clone()).await?;
      println!("deleted {}", id);
    }
  }

  // The settled mutation invalidated the list; this read refetches it
  print_tasks(&sync.read().await?);
  Ok(())
}

fn print_tasks(tasks: &[Task]) {
  if tasks.is_empty() {
    println!("no tasks");
    return;
  }

  for task in tasks {
    let done = if task.completed { "x" } else { " " };
    let end = task
      .end_date
      .map(|d| format!("  done {}", d.format("%Y-%m-%d")))
      .unwrap_or_default();
    println!(
      "[{}] {:<38} {:<12} {}{}",
      done, task.id, task.status, task.title, end
    );
  }
}
