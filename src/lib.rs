//! # resilience-rs
//!
//! A resilience layer for calls to an unreliable upstream data provider: a
//! circuit breaker, a retry policy with exponential backoff, and a façade that
//! composes them with caller-supplied fallbacks.
//!
//! ## Circuit Breaker States
//!
//! - **Closed**: Normal operation. Calls pass through; consecutive failures
//!   are counted and the circuit opens when they reach the threshold.
//! - **Open**: Calls are rejected (or served from the fallback) without
//!   reaching the upstream until the cooldown elapses.
//! - **Half-Open**: A single trial call tests whether the upstream recovered.
//!   Success closes the circuit; failure reopens it with a fresh cooldown.
//!
//! ## Composition
//!
//! [`ResilienceService`] runs each operation through the shared
//! [`RetryPolicy`] *inside* the shared [`CircuitBreaker`], so a burst of
//! transient failures that ends in success counts once toward the breaker's
//! health, and exhausted retries count as a single failure.
//!
//! ```rust
//! use resilience_rs::{BreakerError, ResilienceFactory, ResilienceService, ResilienceSettings};
//! use std::fmt;
//! use std::sync::Arc;
//!
//! #[derive(Debug)]
//! struct UpstreamError(String);
//!
//! impl fmt::Display for UpstreamError {
//!     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
//!         write!(f, "upstream error: {}", self.0)
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let settings = ResilienceSettings {
//!     retry_initial_delay_ms: 5,
//!     ..ResilienceSettings::default()
//! };
//! let service = ResilienceService::new(Arc::new(ResilienceFactory::new(settings)));
//!
//! // Three attempts fail, then the fallback answers.
//! let value = service
//!     .call_with_fallback(
//!         || async { Err::<u32, _>(UpstreamError("timeout".to_string())) },
//!         || async { Ok::<_, UpstreamError>(0) },
//!     )
//!     .await;
//! assert_eq!(value.unwrap(), 0);
//!
//! // Without a fallback the upstream error is returned.
//! let value = service
//!     .call(|| async { Err::<u32, _>(UpstreamError("timeout".to_string())) })
//!     .await;
//! assert!(matches!(value, Err(BreakerError::Operation(_))));
//! println!("{}", service.status().status_message);
//! # }
//! ```
//!
//! ## Configuration
//!
//! [`ResilienceSettings::from_env`] reads `CIRCUIT_BREAKER_THRESHOLD`,
//! `CIRCUIT_BREAKER_RESET_TIMEOUT`, `RETRY_ATTEMPTS`, `RETRY_INITIAL_DELAY`,
//! `RETRY_MAX_DELAY` and `USE_CBF_MODE`. Settings also deserialize with serde.
//!
//! ## Features
//!
//! - `prometheus` - [`MetricSink`] backed by `prometheus-client`

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod breaker;
mod config;
mod error;
mod factory;
mod hook;
mod metrics;
pub mod prelude;
mod retry;
mod service;
pub mod settings;
mod state;

// Re-exports
pub use breaker::{CircuitBreaker, NoFallback};
pub use config::{
    BreakerBuilder, CircuitBreakerConfig, RetryBuilder, RetryConfig, DEFAULT_FAILURE_THRESHOLD,
    DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY, DEFAULT_RESET_TIMEOUT,
};
pub use error::{BreakerError, BreakerResult, ConfigError};
pub use factory::{FactoryBuilder, ResilienceFactory};
pub use hook::HookRegistry;
#[cfg(feature = "prometheus")]
pub use metrics::PrometheusMetricSink;
pub use metrics::{MetricSink, NullMetricSink, StatsSnapshot};
pub use retry::RetryPolicy;
pub use service::{
    ResilienceService, ResilienceStatus, ResilientOperation, ResilientReport, ValueSource,
};
pub use settings::ResilienceSettings;
pub use state::{BreakerSnapshot, CircuitState, Transition};
