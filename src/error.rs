//! Error types for the resilience layer.

use thiserror::Error;

/// Result type for protected calls.
pub type BreakerResult<T, E> = Result<T, BreakerError<E>>;

/// Error returned by a protected call.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is open and no fallback was supplied; the upstream was not called.
    #[error("circuit breaker is open, call was not attempted")]
    Open,

    /// Forced fallback mode is on and no fallback was supplied.
    #[error("circuit is forced open and no fallback is available")]
    ForcedOpen,

    /// The protected operation failed (after any retries).
    #[error("operation failed: {0}")]
    Operation(#[source] E),

    /// The caller-supplied fallback failed.
    #[error("fallback failed: {0}")]
    Fallback(#[source] E),
}

impl<E> BreakerError<E> {
    /// True when the call was short-circuited rather than attempted.
    ///
    /// Callers use this to show degraded-service messaging instead of a
    /// generic upstream error.
    pub fn is_rejection(&self) -> bool {
        matches!(self, BreakerError::Open | BreakerError::ForcedOpen)
    }

    /// The operation's own error, if that is what failed.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            BreakerError::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Unwraps the upstream or fallback error, if any.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Operation(e) | BreakerError::Fallback(e) => Some(e),
            BreakerError::Open | BreakerError::ForcedOpen => None,
        }
    }
}

/// Invalid resilience settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A value could not be parsed as an unsigned integer.
    #[error("{key} must be an unsigned integer, got {value:?}")]
    InvalidNumber {
        /// Setting or environment variable name.
        key: &'static str,
        /// The raw value.
        value: String,
    },

    /// A value that must be positive was zero.
    #[error("{key} must be greater than zero")]
    Zero {
        /// Setting or environment variable name.
        key: &'static str,
    },

    /// The backoff ceiling would cut the first retry delay short.
    #[error("RETRY_MAX_DELAY ({max_delay_ms} ms) must not be below RETRY_INITIAL_DELAY ({initial_delay_ms} ms)")]
    DelayCeilingTooLow {
        /// Configured ceiling in milliseconds.
        max_delay_ms: u64,
        /// Configured initial delay in milliseconds.
        initial_delay_ms: u64,
    },
}
