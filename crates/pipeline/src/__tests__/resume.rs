//! Interrupted runs and resume.

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use pretty_assertions::assert_eq;
  use state::ProgressStore;
  use tokio_util::sync::CancellationToken;

  use crate::__tests__::helpers::{PipelineTestContext, documents, options};
  use crate::{RunMode, RunOptions};

  /// Test: stopping after N of M documents and resuming processes exactly the other M - N.
  #[tokio::test]
  async fn test_resume_processes_only_remaining_documents() {
    let ctx = PipelineTestContext::new();
    let docs = documents(10);

    let cancel = CancellationToken::new();
    ctx.handler.cancel_after(4, cancel.clone());
    let report = ctx.runner(options(1)).run(docs.clone(), RunMode::Fresh, cancel).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.processed, 4);
    assert_eq!(report.not_started, 6);
    let first_batch: HashSet<String> = ctx.handler.applied().into_iter().collect();

    let checkpoint = ProgressStore::new(ctx.progress_path());
    checkpoint.resume();
    assert_eq!(checkpoint.completed_count(), 4);

    ctx.handler.reset();
    let report = ctx
      .runner(options(1))
      .run(docs.clone(), RunMode::Resume, CancellationToken::new())
      .await
      .unwrap();

    assert_eq!(report.skipped_completed, 4);
    assert_eq!(report.processed, 6);
    assert!(report.is_complete());
    let second_batch = ctx.handler.applied();
    assert_eq!(second_batch.len(), 6);
    assert!(second_batch.iter().all(|path| !first_batch.contains(path)));
    assert!(!ctx.progress_path().exists());
  }

  /// Test: with checkpoints every few completions, the state on disk never
  /// claims more than was applied.
  #[tokio::test]
  async fn test_sparse_checkpoints_never_overstate_progress() {
    let ctx = PipelineTestContext::new();
    let docs = documents(9);

    let cancel = CancellationToken::new();
    ctx.handler.cancel_after(5, cancel.clone());
    let sparse = RunOptions {
      workers: 1,
      checkpoint_every: 3,
      force: false,
    };
    ctx.runner(sparse).run(docs.clone(), RunMode::Fresh, cancel).await.unwrap();

    let checkpoint = ProgressStore::new(ctx.progress_path());
    checkpoint.resume();
    let applied: HashSet<String> = ctx.handler.applied().into_iter().collect();
    let completed = checkpoint.snapshot().completed_paths;
    assert!(completed.iter().all(|path| applied.contains(path)));
    assert_eq!(completed.len(), 5, "final persist flushes pending completions");
  }

  /// Test: a fresh run ignores an old checkpoint.
  #[tokio::test]
  async fn test_fresh_run_ignores_checkpoint() {
    let ctx = PipelineTestContext::new();
    let docs = documents(6);

    let cancel = CancellationToken::new();
    ctx.handler.cancel_after(2, cancel.clone());
    ctx.runner(options(1)).run(docs.clone(), RunMode::Fresh, cancel).await.unwrap();
    ctx.handler.reset();

    let mut forced = options(1);
    forced.force = true;
    let report = ctx.runner(forced).run(docs, RunMode::Fresh, CancellationToken::new()).await.unwrap();
    assert_eq!(report.skipped_completed, 0);
    assert_eq!(report.processed, 6);
  }

  /// Test: a run cancelled before it starts does nothing and keeps state.
  #[tokio::test]
  async fn test_cancelled_before_start() {
    let ctx = PipelineTestContext::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = ctx.runner(options(3)).run(documents(5), RunMode::Fresh, cancel).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.processed, 0);
    assert_eq!(report.not_started, 5);
    assert_eq!(ctx.service.calls(), 0);
    assert!(ctx.progress_path().exists());
  }

  /// Test: resuming without a checkpoint behaves like a fresh run.
  #[tokio::test]
  async fn test_resume_without_checkpoint() {
    let ctx = PipelineTestContext::new();
    std::fs::write(ctx.progress_path(), "{ truncated").unwrap();

    let report = ctx
      .runner(options(2))
      .run(documents(3), RunMode::Resume, CancellationToken::new())
      .await
      .unwrap();
    assert_eq!(report.processed, 3);
    assert!(report.is_complete());
  }
}
