//! Retry policy as a value object.
//!
//! Every retry decision the gateway makes goes through [`RetryPolicy`]:
//! whether to try again ([`RetryPolicy::should_retry`]) and how long to wait
//! ([`RetryPolicy::delay_before`]). Both are pure, so the schedule for any
//! sequence of attempt outcomes can be checked with [`RetryPolicy::plan`]
//! without a clock or a network.

use std::time::Duration;

use crosslink_core::RetryConfig;

use crate::OutcomeKind;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
  #[error("max_attempts must be at least 1")]
  ZeroAttempts,
  #[error("backoff_multiplier must be a finite number >= 0, got {0}")]
  Multiplier(f64),
  #[error("jitter_fraction must be within [0, 1], got {0}")]
  Jitter(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
  /// Total attempts, including the first.
  pub max_attempts: u32,
  pub base_delay: Duration,
  pub max_delay: Duration,
  pub backoff_multiplier: f64,
  /// Upper bound of the random extra delay, as a fraction of the backoff.
  pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::from(&RetryConfig::default())
  }
}

impl From<&RetryConfig> for RetryPolicy {
  fn from(config: &RetryConfig) -> Self {
    Self {
      max_attempts: config.max_attempts,
      base_delay: Duration::from_millis(config.base_delay_ms),
      max_delay: Duration::from_millis(config.max_delay_ms),
      backoff_multiplier: config.backoff_multiplier,
      jitter_fraction: config.jitter_fraction,
    }
  }
}

/// One attempt of a planned call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedAttempt {
  pub attempt: u32,
  /// Backoff before this attempt, without jitter.
  pub delay: Duration,
}

/// Schedule derived from a sequence of attempt outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPlan {
  pub attempts: Vec<PlannedAttempt>,
  /// How the call ends; `None` if the outcomes ran out while more attempts
  /// were still allowed.
  pub terminal: Option<OutcomeKind>,
}

impl RetryPolicy {
  /// A policy that never retries.
  pub fn no_retry() -> Self {
    Self {
      max_attempts: 1,
      ..Self::default()
    }
  }

  pub fn validate(&self) -> Result<(), PolicyError> {
    if self.max_attempts == 0 {
      return Err(PolicyError::ZeroAttempts);
    }
    if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 0.0 {
      return Err(PolicyError::Multiplier(self.backoff_multiplier));
    }
    if !(0.0..=1.0).contains(&self.jitter_fraction) {
      return Err(PolicyError::Jitter(self.jitter_fraction));
    }
    Ok(())
  }

  /// Backoff before `attempt` (1-based), without jitter.
  ///
  /// Attempt 1 fires immediately; attempt `n > 1` waits
  /// `min(max_delay, base_delay * multiplier^(n - 2))`.
  pub fn base_delay_for(&self, attempt: u32) -> Duration {
    if attempt <= 1 {
      return Duration::ZERO;
    }
    let exponent = i32::try_from(attempt - 2).unwrap_or(i32::MAX);
    let secs = self.base_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
    match Duration::try_from_secs_f64(secs) {
      Ok(delay) => delay.min(self.max_delay),
      Err(_) => self.max_delay,
    }
  }

  /// Full delay before `attempt`, given a jitter sample in `[0, 1)`.
  ///
  /// The jitter adds up to `jitter_fraction` of the backoff on top of it.
  pub fn delay_before(&self, attempt: u32, jitter_sample: f64) -> Duration {
    let delay = self.base_delay_for(attempt);
    let jitter = self.jitter_fraction * jitter_sample.clamp(0.0, 1.0);
    Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + jitter)).unwrap_or(delay)
  }

  /// Whether an attempt that ended with `kind` is followed by another one.
  pub fn should_retry(&self, kind: OutcomeKind, attempt: u32) -> bool {
    kind == OutcomeKind::RetryableFailure && attempt < self.max_attempts
  }

  /// Walk `outcomes` (one per attempt) the way the gateway would.
  pub fn plan(&self, outcomes: &[OutcomeKind]) -> RetryPlan {
    let mut attempts = Vec::new();
    for (kind, attempt) in outcomes.iter().copied().zip(1..=self.max_attempts) {
      attempts.push(PlannedAttempt {
        attempt,
        delay: self.base_delay_for(attempt),
      });
      if !self.should_retry(kind, attempt) {
        return RetryPlan {
          attempts,
          terminal: Some(kind),
        };
      }
    }
    RetryPlan {
      attempts,
      terminal: None,
    }
  }
}
