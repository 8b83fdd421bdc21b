//! Test helpers for pipeline integration tests.
//!
//! `PipelineTestContext` owns a temporary state directory and builds a fresh
//! `Runner` on every call to `runner()`, reopening tracker and progress from
//! disk the way a restarted process would.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cache::{BoundedCache, CacheLimits};
use crosslink_core::Document;
use llm::{CallGateway, ModelError, ModelRequest, ModelResponse, ModelService, ResponseCache, RetryPolicy};
use state::{IncrementalTracker, ProgressStore};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::{DocumentHandler, PipelineError, RunOptions, Runner};

/// Answers every prompt, except those containing a failure marker.
#[derive(Default)]
pub struct FakeService {
  pub calls: AtomicU32,
  fail_markers: Mutex<Vec<(String, ModelError)>>,
  latency: Duration,
}

impl FakeService {
  pub fn with_latency(latency: Duration) -> Self {
    Self {
      latency,
      ..Default::default()
    }
  }

  pub fn fail_when_prompt_contains(&self, marker: &str, error: ModelError) {
    self.fail_markers.lock().unwrap().push((marker.to_string(), error));
  }

  pub fn clear_failures(&self) {
    self.fail_markers.lock().unwrap().clear();
  }

  pub fn calls(&self) -> u32 {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl ModelService for FakeService {
  fn name(&self) -> &str {
    "fake"
  }

  async fn invoke(&self, request: &ModelRequest, _timeout: Duration) -> Result<String, ModelError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if !self.latency.is_zero() {
      tokio::time::sleep(self.latency).await;
    }
    let failure = self
      .fail_markers
      .lock()
      .unwrap()
      .iter()
      .find(|(marker, _)| request.prompt.contains(marker.as_str()))
      .map(|(_, error)| error.clone());
    match failure {
      Some(error) => Err(error),
      None => Ok(format!("summary of {}", request.prompt.lines().next().unwrap_or_default())),
    }
  }
}

/// Records applied paths; can cancel the run after a number of applies.
#[derive(Default)]
pub struct RecordingHandler {
  pub applied: Mutex<Vec<String>>,
  cancel_after: Mutex<Option<(usize, CancellationToken)>>,
  reject_paths: Mutex<Vec<String>>,
}

impl RecordingHandler {
  pub fn cancel_after(&self, applies: usize, cancel: CancellationToken) {
    *self.cancel_after.lock().unwrap() = Some((applies, cancel));
  }

  pub fn reject(&self, path: &str) {
    self.reject_paths.lock().unwrap().push(path.to_string());
  }

  pub fn applied(&self) -> Vec<String> {
    let mut applied = self.applied.lock().unwrap().clone();
    applied.sort();
    applied
  }

  pub fn reset(&self) {
    self.applied.lock().unwrap().clear();
    *self.cancel_after.lock().unwrap() = None;
    self.reject_paths.lock().unwrap().clear();
  }
}

#[async_trait]
impl DocumentHandler for RecordingHandler {
  fn build_request(&self, document: &Document) -> ModelRequest {
    ModelRequest::new("test-model", format!("{}\n{}", document.path, document.content))
  }

  async fn apply(&self, document: &Document, _response: &ModelResponse) -> Result<(), PipelineError> {
    if self.reject_paths.lock().unwrap().contains(&document.path) {
      return Err(PipelineError::handler(&document.path, "output directory is read-only"));
    }
    let count = {
      let mut applied = self.applied.lock().unwrap();
      applied.push(document.path.clone());
      applied.len()
    };
    if let Some((limit, cancel)) = self.cancel_after.lock().unwrap().as_ref()
      && count >= *limit
    {
      cancel.cancel();
    }
    Ok(())
  }
}

pub struct PipelineTestContext {
  pub state_dir: TempDir,
  pub service: Arc<FakeService>,
  pub cache: Arc<ResponseCache>,
  pub handler: Arc<RecordingHandler>,
}

impl PipelineTestContext {
  pub fn new() -> Self {
    Self::with_service(FakeService::default())
  }

  pub fn with_service(service: FakeService) -> Self {
    Self {
      state_dir: TempDir::new().expect("create state temp dir"),
      service: Arc::new(service),
      cache: Arc::new(BoundedCache::new(CacheLimits::new(256, 1024 * 1024))),
      handler: Arc::new(RecordingHandler::default()),
    }
  }

  pub fn tracker_path(&self) -> PathBuf {
    self.state_dir.path().join("tracker.json")
  }

  pub fn progress_path(&self) -> PathBuf {
    self.state_dir.path().join("progress.json")
  }

  pub fn responses_path(&self) -> PathBuf {
    self.state_dir.path().join("responses.json")
  }

  pub fn gateway(&self) -> Arc<CallGateway> {
    let policy = RetryPolicy {
      max_attempts: 2,
      base_delay: Duration::from_millis(1),
      max_delay: Duration::from_millis(5),
      backoff_multiplier: 2.0,
      jitter_fraction: 0.0,
    };
    Arc::new(CallGateway::new(self.service.clone(), self.cache.clone(), policy))
  }

  /// Build a runner over state reopened from disk.
  pub fn runner(&self, options: RunOptions) -> Runner {
    let (tracker, _) = IncrementalTracker::open(self.tracker_path());
    let progress = ProgressStore::new(self.progress_path());
    Runner::new(self.gateway(), Arc::new(tracker), Arc::new(progress), self.handler.clone()).with_options(options)
  }
}

pub fn options(workers: usize) -> RunOptions {
  RunOptions {
    workers,
    checkpoint_every: 1,
    force: false,
  }
}

pub fn documents(count: usize) -> Vec<Document> {
  (0..count)
    .map(|i| Document::new(format!("notes/doc{i:02}.md"), format!("# Note {i}\n\nBody of note {i}.")))
    .collect()
}
