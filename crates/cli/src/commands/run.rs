use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use cache::{BoundedCache, CacheLimits};
use crosslink_core::PipelineConfig;
use llm::{CallGateway, OllamaService, ResponseStore, RetryPolicy};
use pipeline::{RunMode, RunOptions, Runner};
use state::{IncrementalTracker, ProgressStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::Project;
use crate::discover::discover_documents;
use crate::handler::CategorizeHandler;

pub struct RunArgs {
  pub resume: bool,
  pub force: bool,
  pub workers: Option<usize>,
  pub json: bool,
}

fn run_options(config: &PipelineConfig, args: &RunArgs) -> RunOptions {
  let mut options = RunOptions::from(config);
  if let Some(workers) = args.workers {
    options.workers = workers.clamp(1, PipelineConfig::MAX_WORKERS);
  }
  options.force = args.force;
  options
}

pub async fn cmd_run(project: &Project, args: RunArgs) -> Result<()> {
  let config = &project.config;

  let policy = RetryPolicy::from(&config.retry);
  policy.validate().context("invalid [retry] configuration")?;

  let cache = Arc::new(BoundedCache::new(CacheLimits::new(
    config.cache.max_entries,
    config.cache.max_size_bytes,
  )));
  let response_store = ResponseStore::new(project.responses_path());
  response_store.restore(&cache);

  let service = OllamaService::new().with_url(&config.model.url);
  let health = service.check_health(&config.model.model).await;
  if !health.available {
    warn!(url = %service.base_url(), "Ollama is not reachable; calls will fail after retries");
  } else if !health.configured_model_available {
    warn!(model = %config.model.model, "Model not found in Ollama; run `ollama pull` first");
  }

  let gateway = CallGateway::new(Arc::new(service), cache, policy)
    .with_timeout(Duration::from_secs(config.retry.attempt_timeout_secs))
    .with_validator(Arc::new(CategorizeHandler::validator()));

  let (tracker, _) = IncrementalTracker::open(project.tracker_path());
  let progress = ProgressStore::new(project.progress_path());
  let handler = CategorizeHandler::new(&config.model, project.results_path());

  let runner = Runner::new(
    Arc::new(gateway),
    Arc::new(tracker),
    Arc::new(progress),
    Arc::new(handler),
  )
  .with_options(run_options(&config.pipeline, &args))
  .with_response_store(response_store);

  let documents = discover_documents(&project.root, &config.pipeline);
  info!(root = %project.root.display(), documents = documents.len(), "Discovered documents");

  let cancel = CancellationToken::new();
  let interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("Interrupted, finishing in-flight documents");
      interrupt.cancel();
    }
  });

  let mode = if args.resume { RunMode::Resume } else { RunMode::Fresh };
  let report = runner.run(documents, mode, cancel).await?;

  if args.json {
    println!("{}", serde_json::to_string_pretty(&report)?);
  } else {
    println!("{report}");
  }

  if report.cancelled {
    println!("Run interrupted. Continue with: crosslink run --resume");
  }
  if !report.failures.is_empty() {
    bail!("{} document(s) failed", report.failures.len());
  }
  Ok(())
}
