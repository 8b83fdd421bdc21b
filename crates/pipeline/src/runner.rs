//! Worker pool over a shared document queue.
//!
//! ```text
//! documents -> classify -> queue -> N workers -> gateway -> handler -> mark seen/completed
//! ```
//!
//! Each worker pulls one document at a time from the queue, so the pool size
//! bounds the number of concurrent model calls. Cancellation is checked
//! between documents; an in-flight call runs until it finishes or hits its
//! attempt timeout.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crosslink_core::{Document, PipelineConfig};
use llm::{CallGateway, CallOutcome, ResponseStore};
use state::{Classification, IncrementalTracker, LoadOutcome, ProgressStore, StateError};
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::{DocumentHandler, FailureKind, ItemFailure, PipelineError, RunReport};

/// How a run treats the checkpoint left by a previous run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
  /// Ignore any checkpoint and start a new run.
  Fresh,
  /// Skip documents the interrupted run already completed.
  Resume,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
  pub workers: usize,
  /// Persist state after this many completions.
  pub checkpoint_every: usize,
  /// Process unchanged documents too.
  pub force: bool,
}

impl Default for RunOptions {
  fn default() -> Self {
    Self::from(&PipelineConfig::default())
  }
}

impl From<&PipelineConfig> for RunOptions {
  fn from(config: &PipelineConfig) -> Self {
    Self {
      workers: config.effective_workers(),
      checkpoint_every: config.checkpoint_every.max(1),
      force: false,
    }
  }
}

pub struct Runner {
  gateway: Arc<CallGateway>,
  tracker: Arc<IncrementalTracker>,
  progress: Arc<ProgressStore>,
  handler: Arc<dyn DocumentHandler>,
  response_store: Option<ResponseStore>,
  options: RunOptions,
}

/// Persists tracker and progress together every `every` completions.
struct Checkpointer {
  every: usize,
  pending: Mutex<usize>,
}

impl Checkpointer {
  /// The tracker is written before the progress set, so a path recorded as
  /// completed on disk always has its digest on disk too.
  fn completed(&self, tracker: &IncrementalTracker, progress: &ProgressStore) -> Result<(), StateError> {
    let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
    *pending += 1;
    if *pending >= self.every {
      tracker.persist()?;
      progress.persist()?;
      trace!(completed = progress.completed_count(), "Checkpoint written");
      *pending = 0;
    }
    Ok(())
  }
}

struct WorkerContext {
  gateway: Arc<CallGateway>,
  tracker: Arc<IncrementalTracker>,
  progress: Arc<ProgressStore>,
  handler: Arc<dyn DocumentHandler>,
  checkpoint: Checkpointer,
}

#[derive(Default)]
struct WorkerTally {
  processed: usize,
  failures: Vec<ItemFailure>,
}

impl Runner {
  pub fn new(
    gateway: Arc<CallGateway>,
    tracker: Arc<IncrementalTracker>,
    progress: Arc<ProgressStore>,
    handler: Arc<dyn DocumentHandler>,
  ) -> Self {
    Self {
      gateway,
      tracker,
      progress,
      handler,
      response_store: None,
      options: RunOptions::default(),
    }
  }

  pub fn with_options(mut self, options: RunOptions) -> Self {
    self.options = options;
    self
  }

  /// Save the gateway's response cache here when a run ends.
  pub fn with_response_store(mut self, store: ResponseStore) -> Self {
    self.response_store = Some(store);
    self
  }

  pub fn options(&self) -> &RunOptions {
    &self.options
  }

  /// Run `documents` through the pool.
  ///
  /// Only state persistence failures are returned as errors; per-document
  /// failures are collected in the report.
  pub async fn run(
    &self,
    documents: Vec<Document>,
    mode: RunMode,
    cancel: CancellationToken,
  ) -> Result<RunReport, PipelineError> {
    let started = Instant::now();
    let mut report = RunReport::default();

    match mode {
      RunMode::Fresh => self.progress.start_fresh()?,
      RunMode::Resume => {
        if let LoadOutcome::Loaded { records } = self.progress.resume() {
          debug!(completed = records, "Resuming with checkpoint");
        }
      }
    }

    let mut seen: HashSet<String> = HashSet::with_capacity(documents.len());
    let mut queue = Vec::new();
    for document in documents {
      if !seen.insert(document.path.clone()) {
        warn!(path = %document.path, "Duplicate document path, keeping the first");
        continue;
      }
      report.total += 1;

      let classification = self.tracker.classify(&document.path, &document.content);
      match classification {
        Classification::New => report.new += 1,
        Classification::Changed => report.changed += 1,
        Classification::Unchanged => report.unchanged += 1,
      }

      // completed paths edited since the interrupted run are processed again
      if classification == Classification::Unchanged && self.progress.is_completed(&document.path) {
        trace!(path = %document.path, "Already completed, skipping");
        report.skipped_completed += 1;
      } else if classification == Classification::Unchanged && !self.options.force {
        trace!(path = %document.path, "Unchanged, skipping");
        report.skipped_unchanged += 1;
      } else {
        debug!(path = %document.path, %classification, "Queued");
        queue.push(document);
      }
    }

    info!(
      total = report.total,
      new = report.new,
      changed = report.changed,
      unchanged = report.unchanged,
      queued = queue.len(),
      workers = self.options.workers,
      "Starting run"
    );

    let dispatched = queue.len();
    let tally = self.dispatch(queue, &cancel).await?;
    report.processed = tally.processed;
    report.failures = tally.failures;
    report.failures.sort_by(|a, b| a.path.cmp(&b.path));
    report.cancelled = cancel.is_cancelled();
    report.not_started = dispatched - report.processed - report.failures.len();

    report.deleted = self.tracker.reconcile(seen.iter().map(String::as_str));
    for path in &report.deleted {
      debug!(path = %path, "Document deleted since last run");
    }
    self.tracker.persist()?;
    self.progress.persist()?;

    if let Some(store) = &self.response_store
      && let Err(e) = store.save(self.gateway.cache())
    {
      warn!(err = %e, "Failed to save response cache");
    }

    if report.is_complete() {
      self.progress.discard()?;
    } else {
      info!(
        completed = self.progress.completed_count(),
        "Run incomplete, checkpoint kept for resume"
      );
    }

    report.gateway = self.gateway.stats();
    report.elapsed = started.elapsed();
    info!(
      processed = report.processed,
      failed = report.failures.len(),
      deleted = report.deleted.len(),
      cancelled = report.cancelled,
      elapsed_ms = report.elapsed.as_millis() as u64,
      "Run finished"
    );
    Ok(report)
  }

  async fn dispatch(&self, queue: Vec<Document>, cancel: &CancellationToken) -> Result<WorkerTally, PipelineError> {
    let mut tally = WorkerTally::default();
    if queue.is_empty() {
      return Ok(tally);
    }

    let (tx, rx) = mpsc::channel(queue.len());
    for document in queue {
      // capacity equals the queue length, so this never waits
      if tx.send(document).await.is_err() {
        break;
      }
    }
    drop(tx);
    let rx = Arc::new(AsyncMutex::new(rx));

    let ctx = Arc::new(WorkerContext {
      gateway: self.gateway.clone(),
      tracker: self.tracker.clone(),
      progress: self.progress.clone(),
      handler: self.handler.clone(),
      checkpoint: Checkpointer {
        every: self.options.checkpoint_every.max(1),
        pending: Mutex::new(0),
      },
    });

    // a worker that fails to persist stops the others
    let worker_cancel = cancel.child_token();
    let mut workers = JoinSet::new();
    for worker_id in 0..self.options.workers.max(1) {
      let rx = rx.clone();
      let ctx = ctx.clone();
      let cancel = worker_cancel.clone();
      workers.spawn(async move { worker(worker_id, rx, ctx, cancel).await });
    }

    let mut first_error = None;
    while let Some(joined) = workers.join_next().await {
      match joined.map_err(PipelineError::from).and_then(|result| result) {
        Ok(worker_tally) => {
          tally.processed += worker_tally.processed;
          tally.failures.extend(worker_tally.failures);
        }
        Err(e) => {
          error!(err = %e, "Worker failed, stopping run");
          worker_cancel.cancel();
          first_error.get_or_insert(e);
        }
      }
    }

    match first_error {
      Some(e) => Err(e),
      None => Ok(tally),
    }
  }
}

async fn worker(
  worker_id: usize,
  rx: Arc<AsyncMutex<mpsc::Receiver<Document>>>,
  ctx: Arc<WorkerContext>,
  cancel: CancellationToken,
) -> Result<WorkerTally, PipelineError> {
  trace!(worker_id, "Worker starting");
  let mut tally = WorkerTally::default();

  loop {
    let next = {
      let mut rx = rx.lock().await;
      tokio::select! {
        biased;
        _ = cancel.cancelled() => {
          debug!(worker_id, processed = tally.processed, "Worker cancelled");
          break;
        }
        next = rx.recv() => next
      }
    };
    let Some(document) = next else {
      break;
    };

    match process(&ctx, &document).await? {
      None => tally.processed += 1,
      Some(failure) => {
        error!(
          worker_id,
          path = %failure.path,
          kind = %failure.kind,
          attempts = failure.attempts,
          err = %failure.message,
          "Document failed"
        );
        tally.failures.push(failure);
      }
    }
  }

  trace!(worker_id, processed = tally.processed, "Worker finished");
  Ok(tally)
}

/// Process one document. Returns the failure, if any; `Err` is reserved for
/// state persistence errors that should stop the run.
async fn process(ctx: &WorkerContext, document: &Document) -> Result<Option<ItemFailure>, PipelineError> {
  let request = ctx.handler.build_request(document);
  let outcome = ctx.gateway.call(&request).await;
  let CallOutcome::Success(response) = &outcome else {
    return Ok(ItemFailure::from_outcome(&document.path, &outcome));
  };

  if let Err(e) = ctx.handler.apply(document, response).await {
    return Ok(Some(ItemFailure {
      path: document.path.clone(),
      kind: FailureKind::Handler,
      message: e.to_string(),
      attempts: 0,
    }));
  }

  // only after the result is applied
  ctx.tracker.mark_seen(&document.path, &document.content);
  ctx.progress.mark_completed(&document.path);
  ctx.checkpoint.completed(&ctx.tracker, &ctx.progress)?;
  debug!(path = %document.path, "Document completed");
  Ok(None)
}
