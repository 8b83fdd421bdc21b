//! The single entry point for model calls.
//!
//! [`CallGateway::call`] serves a request from the response cache when it can,
//! and otherwise runs the retry loop against the [`ModelService`] under a
//! per-attempt timeout. Concurrent identical requests share one network call:
//! the first caller holds a per-key lock while the others wait and then find
//! the response in the cache.

use std::sync::Arc;
use std::time::Duration;

use cache::{BoundedCache, PutResult};
use dashmap::DashMap;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, error, info, trace, warn};

use crate::{
  AcceptAll, AttemptEvent, CacheKey, CallOutcome, Failure, GatewayCounters, GatewayStats, MetricsSink, ModelError,
  ModelRequest, ModelResponse, ModelService, OutcomeKind, ResponseValidator, RetryPolicy, TracingMetricsSink,
};

const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(120);

pub type ResponseCache = BoundedCache<CacheKey, ModelResponse>;

pub struct CallGateway {
  service: Arc<dyn ModelService>,
  cache: Arc<ResponseCache>,
  policy: RetryPolicy,
  attempt_timeout: Duration,
  metrics: Arc<dyn MetricsSink>,
  validator: Arc<dyn ResponseValidator>,
  counters: Arc<GatewayCounters>,
  inflight: DashMap<CacheKey, Arc<Mutex<()>>>,
}

impl CallGateway {
  pub fn new(service: Arc<dyn ModelService>, cache: Arc<ResponseCache>, policy: RetryPolicy) -> Self {
    Self {
      service,
      cache,
      policy,
      attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
      metrics: Arc::new(TracingMetricsSink),
      validator: Arc::new(AcceptAll),
      counters: Arc::new(GatewayCounters::new()),
      inflight: DashMap::new(),
    }
  }

  pub fn with_timeout(mut self, attempt_timeout: Duration) -> Self {
    self.attempt_timeout = attempt_timeout;
    self
  }

  pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
    self.metrics = metrics;
    self
  }

  pub fn with_validator(mut self, validator: Arc<dyn ResponseValidator>) -> Self {
    self.validator = validator;
    self
  }

  pub fn with_counters(mut self, counters: Arc<GatewayCounters>) -> Self {
    self.counters = counters;
    self
  }

  pub fn cache(&self) -> &Arc<ResponseCache> {
    &self.cache
  }

  pub fn stats(&self) -> GatewayStats {
    self.counters.snapshot()
  }

  /// Call the model for `request`.
  ///
  /// Never panics or returns early on a transient error: the outcome says
  /// whether the call succeeded, failed for good, or ran out of attempts.
  pub async fn call(&self, request: &ModelRequest) -> CallOutcome {
    let key = request.cache_key();
    if let Some(response) = self.lookup(&key) {
      return CallOutcome::Success(response);
    }

    let lock = self.inflight.entry(key).or_default().clone();
    let outcome = {
      let _guard = lock.lock().await;
      match self.lookup(&key) {
        // another caller finished the same request while we waited
        Some(response) => CallOutcome::Success(response),
        None => self.call_uncached(&key, request).await,
      }
    };

    drop(lock);
    self.inflight.remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
    outcome
  }

  fn lookup(&self, key: &CacheKey) -> Option<ModelResponse> {
    let response = self.cache.get(key)?;
    self.counters.cache_hit();
    trace!(key = %key, "Response cache hit");
    Some(response)
  }

  async fn call_uncached(&self, key: &CacheKey, request: &ModelRequest) -> CallOutcome {
    self.counters.cache_miss();
    let max_attempts = self.policy.max_attempts;
    let mut attempt = 1;

    loop {
      if attempt > 1 {
        let delay = self.policy.delay_before(attempt, jitter_sample());
        debug!(
          key = %key,
          attempt,
          max_attempts,
          delay_ms = delay.as_millis() as u64,
          "Retrying model call after backoff"
        );
        sleep(delay).await;
      }

      self.counters.attempt();
      let started = Instant::now();
      let result = match timeout(self.attempt_timeout, self.service.invoke(request, self.attempt_timeout)).await {
        Ok(result) => result,
        Err(_) => Err(ModelError::Timeout(self.attempt_timeout)),
      }
      .and_then(|text| self.validator.validate(&text).map(|()| text));

      let kind = match &result {
        Ok(_) => OutcomeKind::Success,
        Err(e) if e.is_retryable() => OutcomeKind::RetryableFailure,
        Err(_) => OutcomeKind::FatalFailure,
      };
      self.metrics.record(&AttemptEvent {
        attempt,
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        outcome: kind,
        response_size: result.as_ref().map_or(0, String::len),
      });

      let error = match result {
        Ok(text) => {
          let response = ModelResponse::new(text, &request.model);
          if let PutResult::Rejected { size_bytes, max_size_bytes } = self.cache.put_estimated(*key, response.clone()) {
            debug!(key = %key, size_bytes, max_size_bytes, "Response too large to cache");
          }
          self.counters.finished(OutcomeKind::Success);
          if attempt > 1 {
            info!(key = %key, attempt, "Model call succeeded after retry");
          }
          return CallOutcome::Success(response);
        }
        Err(error) => error,
      };

      if self.policy.should_retry(kind, attempt) {
        warn!(
          service = self.service.name(),
          attempt,
          max_attempts,
          err = %error,
          "Retryable model error, will retry"
        );
        attempt += 1;
        continue;
      }

      self.counters.finished(kind);
      let failure = Failure {
        error,
        attempts: attempt,
      };
      return match kind {
        OutcomeKind::RetryableFailure => {
          warn!(service = self.service.name(), key = %key, failure = %failure, "All retries exhausted");
          CallOutcome::RetryableFailure(failure)
        }
        _ => {
          error!(service = self.service.name(), key = %key, failure = %failure, "Model call failed");
          CallOutcome::FatalFailure(failure)
        }
      };
    }
  }
}

fn jitter_sample() -> f64 {
  rand::thread_rng().gen_range(0.0..1.0)
}
