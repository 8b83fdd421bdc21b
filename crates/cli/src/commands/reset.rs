use anyhow::{Context, Result};
use tracing::info;

use super::Project;

/// Delete persisted state so the next run reprocesses everything.
///
/// The results file is kept unless `results` is set.
pub async fn cmd_reset(project: &Project, results: bool) -> Result<()> {
  let mut targets = vec![
    project.tracker_path(),
    project.progress_path(),
    project.responses_path(),
  ];
  if results {
    targets.push(project.results_path());
  }

  let mut removed = 0;
  for path in targets {
    if !path.exists() {
      continue;
    }
    state::atomic::remove(&path).with_context(|| format!("failed to remove {}", path.display()))?;
    info!(path = %path.display(), "Removed state file");
    println!("Removed {}", path.display());
    removed += 1;
  }

  if removed == 0 {
    println!("Nothing to reset in {}", project.state_dir.display());
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[tokio::test]
  async fn test_reset_keeps_results_by_default() {
    let temp = TempDir::new().unwrap();
    let project = Project::open(Some(temp.path())).unwrap();
    std::fs::create_dir_all(&project.state_dir).unwrap();
    for path in [project.tracker_path(), project.progress_path(), project.results_path()] {
      std::fs::write(path, "{}").unwrap();
    }

    cmd_reset(&project, false).await.unwrap();
    assert!(!project.tracker_path().exists());
    assert!(!project.progress_path().exists());
    assert!(project.results_path().exists());

    cmd_reset(&project, true).await.unwrap();
    assert!(!project.results_path().exists());
  }
}
