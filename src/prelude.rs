//! Re-exports the types most callers need.
//!
//! # Example
//! ```rust,no_run
//! use resilience_rs::prelude::*;
//! ```

pub use crate::breaker::CircuitBreaker;
pub use crate::error::{BreakerError, BreakerResult};
pub use crate::factory::ResilienceFactory;
pub use crate::retry::RetryPolicy;
pub use crate::service::{ResilienceService, ResilienceStatus};
pub use crate::settings::ResilienceSettings;
pub use crate::state::CircuitState;
