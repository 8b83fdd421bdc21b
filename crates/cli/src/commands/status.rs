use anyhow::Result;
use cache::{BoundedCache, CacheLimits};
use serde::Serialize;
use state::atomic::{self, Loaded};
use state::{IncrementalTracker, LoadOutcome, ProgressState};

use super::Project;
use crate::handler::read_results;

#[derive(Debug, Serialize)]
struct Status {
  root: String,
  state_dir: String,
  tracked_documents: usize,
  tracker_state: String,
  /// Present when an interrupted run can be resumed.
  checkpoint: Option<ProgressSummary>,
  cached_responses: usize,
  cached_bytes: usize,
  results: usize,
}

#[derive(Debug, Serialize)]
struct ProgressSummary {
  run_started_at: String,
  completed: usize,
}

fn describe(outcome: &LoadOutcome) -> String {
  match outcome {
    LoadOutcome::Loaded { .. } => "ok".to_string(),
    LoadOutcome::Missing => "none".to_string(),
    LoadOutcome::Corrupt { reason } => format!("corrupt ({reason})"),
  }
}

/// Read-only peek at the checkpoint; does not go through `ProgressStore::resume`.
fn read_checkpoint(project: &Project) -> Option<ProgressSummary> {
  #[derive(serde::Deserialize)]
  struct File {
    #[serde(flatten)]
    state: ProgressState,
  }
  match atomic::read_json::<File>(&project.progress_path()) {
    Loaded::Found(file) => Some(ProgressSummary {
      run_started_at: file.state.run_started_at.to_rfc3339(),
      completed: file.state.completed_paths.len(),
    }),
    Loaded::Missing | Loaded::Corrupt(_) => None,
  }
}

pub async fn cmd_status(project: &Project, json: bool) -> Result<()> {
  let (tracker, tracker_outcome) = IncrementalTracker::open(project.tracker_path());

  let limits = CacheLimits::new(
    project.config.cache.max_entries,
    project.config.cache.max_size_bytes,
  );
  let cache = BoundedCache::new(limits);
  llm::ResponseStore::new(project.responses_path()).restore(&cache);
  let cache_stats = cache.stats();

  let status = Status {
    root: project.root.display().to_string(),
    state_dir: project.state_dir.display().to_string(),
    tracked_documents: tracker.len(),
    tracker_state: describe(&tracker_outcome),
    checkpoint: read_checkpoint(project),
    cached_responses: cache_stats.count,
    cached_bytes: cache_stats.total_size_bytes,
    results: read_results(&project.results_path())?.len(),
  };

  if json {
    println!("{}", serde_json::to_string_pretty(&status)?);
    return Ok(());
  }

  println!("Project:    {}", status.root);
  println!("State:      {}", status.state_dir);
  println!(
    "Tracked:    {} documents (state: {})",
    status.tracked_documents, status.tracker_state
  );
  match &status.checkpoint {
    Some(checkpoint) => println!(
      "Checkpoint: {} completed in run started {} (resume with `crosslink run --resume`)",
      checkpoint.completed, checkpoint.run_started_at
    ),
    None => println!("Checkpoint: none"),
  }
  println!(
    "Cache:      {} responses, {} bytes",
    status.cached_responses, status.cached_bytes
  );
  println!("Results:    {}", status.results);
  Ok(())
}
