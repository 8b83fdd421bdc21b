//! Incremental processing across runs.

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use crosslink_core::Document;
  use llm::{ModelError, ResponseStore};
  use pretty_assertions::assert_eq;
  use state::LoadOutcome;
  use tokio_util::sync::CancellationToken;

  use crate::RunMode;
  use crate::__tests__::helpers::{FakeService, PipelineTestContext, documents, options};

  /// Test: a fresh run processes everything and leaves no checkpoint.
  #[tokio::test]
  async fn test_fresh_run_processes_all_documents() {
    let ctx = PipelineTestContext::new();
    let docs = documents(5);

    let report = ctx
      .runner(options(2))
      .run(docs.clone(), RunMode::Fresh, CancellationToken::new())
      .await
      .expect("run should succeed");

    assert_eq!(report.total, 5);
    assert_eq!(report.new, 5);
    assert_eq!(report.processed, 5);
    assert!(report.is_complete());
    assert_eq!(ctx.handler.applied().len(), 5);
    assert_eq!(ctx.service.calls(), 5);
    assert!(ctx.tracker_path().exists());
    assert!(!ctx.progress_path().exists(), "checkpoint is discarded after a complete run");
  }

  /// Test: a second run over the same content does no work.
  #[tokio::test]
  async fn test_unchanged_documents_are_skipped() {
    let ctx = PipelineTestContext::new();
    let docs = documents(4);
    ctx.runner(options(2)).run(docs.clone(), RunMode::Fresh, CancellationToken::new()).await.unwrap();
    ctx.handler.reset();

    let report = ctx.runner(options(2)).run(docs, RunMode::Fresh, CancellationToken::new()).await.unwrap();

    assert_eq!(report.unchanged, 4);
    assert_eq!(report.skipped_unchanged, 4);
    assert_eq!(report.processed, 0);
    assert!(ctx.handler.applied().is_empty());
    assert_eq!(ctx.service.calls(), 4);
  }

  /// Test: only edited and added documents are processed.
  #[tokio::test]
  async fn test_changed_and_new_documents_are_processed() {
    let ctx = PipelineTestContext::new();
    let mut docs = documents(3);
    ctx.runner(options(1)).run(docs.clone(), RunMode::Fresh, CancellationToken::new()).await.unwrap();
    ctx.handler.reset();

    docs[1].content.push_str("\nAn added paragraph.");
    docs.push(Document::new("notes/extra.md", "fresh"));
    let report = ctx.runner(options(1)).run(docs, RunMode::Fresh, CancellationToken::new()).await.unwrap();

    assert_eq!((report.new, report.changed, report.unchanged), (1, 1, 2));
    assert_eq!(
      ctx.handler.applied(),
      vec!["notes/doc01.md".to_string(), "notes/extra.md".to_string()]
    );
  }

  /// Test: documents missing from a run are reported deleted and forgotten.
  #[tokio::test]
  async fn test_deleted_documents_are_reconciled() {
    let ctx = PipelineTestContext::new();
    let docs = documents(3);
    ctx.runner(options(1)).run(docs.clone(), RunMode::Fresh, CancellationToken::new()).await.unwrap();

    let report = ctx
      .runner(options(1))
      .run(docs[..1].to_vec(), RunMode::Fresh, CancellationToken::new())
      .await
      .unwrap();
    assert_eq!(report.deleted, vec!["notes/doc01.md".to_string(), "notes/doc02.md".to_string()]);

    // brought back, they count as new again
    let report = ctx.runner(options(1)).run(docs, RunMode::Fresh, CancellationToken::new()).await.unwrap();
    assert_eq!(report.new, 2);
  }

  /// Test: forcing reprocesses unchanged documents from the response cache.
  #[tokio::test]
  async fn test_force_reuses_cached_responses() {
    let ctx = PipelineTestContext::new();
    let docs = documents(3);
    ctx.runner(options(2)).run(docs.clone(), RunMode::Fresh, CancellationToken::new()).await.unwrap();
    ctx.handler.reset();

    let mut forced = options(2);
    forced.force = true;
    let report = ctx.runner(forced).run(docs, RunMode::Fresh, CancellationToken::new()).await.unwrap();

    assert_eq!(report.processed, 3);
    assert_eq!(report.gateway.cache_hits, 3);
    assert_eq!(ctx.service.calls(), 3, "no new network calls");
  }

  /// Test: duplicate paths in the input are processed once.
  #[tokio::test]
  async fn test_duplicate_paths_are_ignored() {
    let ctx = PipelineTestContext::new();
    let docs = vec![Document::new("a.md", "one"), Document::new("a.md", "two")];
    let report = ctx.runner(options(2)).run(docs, RunMode::Fresh, CancellationToken::new()).await.unwrap();
    assert_eq!(report.total, 1);
    assert_eq!(ctx.handler.applied(), vec!["a.md".to_string()]);
  }

  /// Test: each document is handled exactly once with several workers.
  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_worker_pool_processes_each_document_once() {
    let ctx = PipelineTestContext::with_service(FakeService::with_latency(Duration::from_millis(5)));
    let docs = documents(24);

    let report = ctx.runner(options(4)).run(docs.clone(), RunMode::Fresh, CancellationToken::new()).await.unwrap();

    assert_eq!(report.processed, 24);
    let expected: Vec<String> = docs.iter().map(|d| d.path.clone()).collect();
    assert_eq!(ctx.handler.applied(), expected);
    assert_eq!(ctx.service.calls(), 24);
  }

  /// Test: failed documents are reported by kind and not marked seen.
  #[tokio::test]
  async fn test_failures_are_reported_and_retried_next_run() {
    let ctx = PipelineTestContext::new();
    ctx.service.fail_when_prompt_contains("doc01", ModelError::Unauthorized { status: 401 });
    ctx
      .service
      .fail_when_prompt_contains("doc02", ModelError::Connection("connection reset".into()));
    ctx.handler.reject("notes/doc03.md");

    let report = ctx.runner(options(2)).run(documents(5), RunMode::Fresh, CancellationToken::new()).await.unwrap();

    let kinds: Vec<(String, crate::FailureKind, u32)> = report
      .failures
      .iter()
      .map(|f| (f.path.clone(), f.kind, f.attempts))
      .collect();
    assert_eq!(
      kinds,
      vec![
        ("notes/doc01.md".to_string(), crate::FailureKind::Fatal, 1),
        ("notes/doc02.md".to_string(), crate::FailureKind::RetriesExhausted, 2),
        ("notes/doc03.md".to_string(), crate::FailureKind::Handler, 0),
      ]
    );
    assert_eq!(report.processed, 2);
    assert!(!report.is_complete());

    ctx.service.clear_failures();
    ctx.handler.reset();
    let report = ctx.runner(options(2)).run(documents(5), RunMode::Fresh, CancellationToken::new()).await.unwrap();
    assert_eq!(report.processed, 3);
    assert_eq!(report.new, 3);
    assert!(report.is_complete());
  }

  /// Test: the response cache is saved at the end of a run and restorable.
  #[tokio::test]
  async fn test_response_cache_is_saved() {
    let ctx = PipelineTestContext::new();
    let store = ResponseStore::new(ctx.responses_path());
    ctx
      .runner(options(2))
      .with_response_store(store.clone())
      .run(documents(3), RunMode::Fresh, CancellationToken::new())
      .await
      .unwrap();

    let restored = PipelineTestContext::new();
    assert_eq!(store.restore(&restored.cache), LoadOutcome::Loaded { records: 3 });
    assert_eq!(restored.cache.len(), 3);
  }
}
