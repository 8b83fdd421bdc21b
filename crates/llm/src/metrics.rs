//! Per-attempt metrics and injected gateway counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use tracing::debug;

use crate::OutcomeKind;

/// One network attempt made by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptEvent {
  pub attempt: u32,
  pub duration_ms: u64,
  pub outcome: OutcomeKind,
  /// Approximate size of the response text; 0 on failure.
  pub response_size: usize,
}

/// Receives one event per attempt. Must not block.
pub trait MetricsSink: Send + Sync {
  fn record(&self, event: &AttemptEvent);
}

/// Default sink: one `debug!` line per attempt.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
  fn record(&self, event: &AttemptEvent) {
    debug!(
      attempt = event.attempt,
      duration_ms = event.duration_ms,
      outcome = %event.outcome,
      response_size = event.response_size,
      "Model call attempt"
    );
  }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingMetricsSink {
  events: Mutex<Vec<AttemptEvent>>,
}

impl RecordingMetricsSink {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn events(&self) -> Vec<AttemptEvent> {
    self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }
}

impl MetricsSink for RecordingMetricsSink {
  fn record(&self, event: &AttemptEvent) {
    self
      .events
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(event.clone());
  }
}

/// Thread-safe counters owned by whoever builds the gateway.
#[derive(Debug, Default)]
pub struct GatewayCounters {
  cache_hits: AtomicU64,
  cache_misses: AtomicU64,
  attempts: AtomicU64,
  successes: AtomicU64,
  retryable_failures: AtomicU64,
  fatal_failures: AtomicU64,
}

/// Point-in-time copy of [`GatewayCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GatewayStats {
  pub cache_hits: u64,
  pub cache_misses: u64,
  /// Network attempts, including retries.
  pub attempts: u64,
  /// Calls that returned `Success` from the network.
  pub successes: u64,
  /// Calls that ended in `RetryableFailure` after exhausting attempts.
  pub retryable_failures: u64,
  pub fatal_failures: u64,
}

impl GatewayCounters {
  pub fn new() -> Self {
    Self::default()
  }

  pub(crate) fn cache_hit(&self) {
    self.cache_hits.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn cache_miss(&self) {
    self.cache_misses.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn attempt(&self) {
    self.attempts.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn finished(&self, kind: OutcomeKind) {
    let counter = match kind {
      OutcomeKind::Success => &self.successes,
      OutcomeKind::RetryableFailure => &self.retryable_failures,
      OutcomeKind::FatalFailure => &self.fatal_failures,
    };
    counter.fetch_add(1, Ordering::Relaxed);
  }

  pub fn snapshot(&self) -> GatewayStats {
    GatewayStats {
      cache_hits: self.cache_hits.load(Ordering::Relaxed),
      cache_misses: self.cache_misses.load(Ordering::Relaxed),
      attempts: self.attempts.load(Ordering::Relaxed),
      successes: self.successes.load(Ordering::Relaxed),
      retryable_failures: self.retryable_failures.load(Ordering::Relaxed),
      fatal_failures: self.fatal_failures.load(Ordering::Relaxed),
    }
  }
}
