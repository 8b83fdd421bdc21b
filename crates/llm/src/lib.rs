//! Calls to the remote model service.
//!
//! Everything that talks to the model goes through [`CallGateway`], which
//! owns the response cache, the retry loop and error classification.
//! [`ModelService`] is the transport seam; [`OllamaService`] is the
//! production implementation.

mod error;
mod gateway;
mod metrics;
mod ollama;
mod outcome;
mod policy;
mod request;
mod service;
mod store;
mod validate;

pub use error::ModelError;
pub use gateway::{CallGateway, ResponseCache};
pub use metrics::{AttemptEvent, GatewayCounters, GatewayStats, MetricsSink, RecordingMetricsSink, TracingMetricsSink};
pub use ollama::{OllamaHealthStatus, OllamaService};
pub use outcome::{CallOutcome, Failure, OutcomeKind};
pub use policy::{PlannedAttempt, PolicyError, RetryPlan, RetryPolicy};
pub use request::{CacheKey, ModelOptions, ModelRequest, ModelResponse};
pub use service::ModelService;
pub use store::ResponseStore;
pub use validate::{AcceptAll, JsonFieldsValidator, ResponseValidator, TypedJsonValidator};
