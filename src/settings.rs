//! Process-wide resilience settings.
//!
//! Settings are read once at startup, either from the environment with
//! [`ResilienceSettings::from_env`] or as part of a host application's
//! configuration file through `serde`. Missing values take the defaults below.
//!
//! | Variable                        | Field                    | Default |
//! |---------------------------------|--------------------------|---------|
//! | `CIRCUIT_BREAKER_THRESHOLD`     | `failure_threshold`      | 5       |
//! | `CIRCUIT_BREAKER_RESET_TIMEOUT` | `reset_timeout_ms`       | 30000   |
//! | `RETRY_ATTEMPTS`                | `retry_attempts`         | 3       |
//! | `RETRY_INITIAL_DELAY`           | `retry_initial_delay_ms` | 1000    |
//! | `RETRY_MAX_DELAY`               | `retry_max_delay_ms`     | 30000   |
//! | `USE_CBF_MODE`                  | `force_fallback`         | false   |
//!
//! When `RETRY_MAX_DELAY` is unset and `RETRY_INITIAL_DELAY` exceeds 30000,
//! the ceiling defaults to the initial delay.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{
    CircuitBreakerConfig, RetryConfig, DEFAULT_FAILURE_THRESHOLD, DEFAULT_INITIAL_DELAY,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY, DEFAULT_RESET_TIMEOUT,
};
use crate::error::ConfigError;

/// Environment variable for the failure threshold.
pub const ENV_FAILURE_THRESHOLD: &str = "CIRCUIT_BREAKER_THRESHOLD";
/// Environment variable for the cooldown in milliseconds.
pub const ENV_RESET_TIMEOUT: &str = "CIRCUIT_BREAKER_RESET_TIMEOUT";
/// Environment variable for the number of attempts.
pub const ENV_RETRY_ATTEMPTS: &str = "RETRY_ATTEMPTS";
/// Environment variable for the first backoff delay in milliseconds.
pub const ENV_RETRY_INITIAL_DELAY: &str = "RETRY_INITIAL_DELAY";
/// Environment variable for the backoff ceiling in milliseconds.
pub const ENV_RETRY_MAX_DELAY: &str = "RETRY_MAX_DELAY";
/// Environment variable that forces fallback mode when set to `true`.
pub const ENV_FORCE_FALLBACK: &str = "USE_CBF_MODE";

/// Settings for the shared breaker and retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Cooldown before an open circuit admits a trial call, in milliseconds.
    pub reset_timeout_ms: u64,
    /// Attempts per call, including the first.
    pub retry_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    pub retry_initial_delay_ms: u64,
    /// Ceiling on any single backoff delay, in milliseconds.
    pub retry_max_delay_ms: u64,
    /// Serve fallbacks without ever calling the upstream.
    pub force_fallback: bool,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            reset_timeout_ms: DEFAULT_RESET_TIMEOUT.as_millis() as u64,
            retry_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_initial_delay_ms: DEFAULT_INITIAL_DELAY.as_millis() as u64,
            retry_max_delay_ms: DEFAULT_MAX_DELAY.as_millis() as u64,
            force_fallback: false,
        }
    }
}

impl ResilienceSettings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let settings = Self::from_lookup(|key| std::env::var(key).ok())?;
        tracing::debug!(?settings, "loaded resilience settings from environment");
        Ok(settings)
    }

    /// Reads settings through `lookup`, which maps a variable name to its value.
    ///
    /// Unset or blank variables keep their defaults. `USE_CBF_MODE` is on only
    /// for the value `true`, in any case.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let retry_initial_delay_ms = parse_or(
            &lookup,
            ENV_RETRY_INITIAL_DELAY,
            defaults.retry_initial_delay_ms,
        )?;
        // An unset ceiling never cuts the first wait short.
        let default_max_delay_ms = defaults.retry_max_delay_ms.max(retry_initial_delay_ms);

        let settings = Self {
            failure_threshold: parse_or(&lookup, ENV_FAILURE_THRESHOLD, defaults.failure_threshold)?,
            reset_timeout_ms: parse_or(&lookup, ENV_RESET_TIMEOUT, defaults.reset_timeout_ms)?,
            retry_attempts: parse_or(&lookup, ENV_RETRY_ATTEMPTS, defaults.retry_attempts)?,
            retry_initial_delay_ms,
            retry_max_delay_ms: parse_or(&lookup, ENV_RETRY_MAX_DELAY, default_max_delay_ms)?,
            force_fallback: lookup(ENV_FORCE_FALLBACK)
                .map(|raw| raw.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.force_fallback),
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Checks that every value that must be positive is, and that the
    /// backoff ceiling is not below the initial delay.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Zero {
                key: ENV_FAILURE_THRESHOLD,
            });
        }
        if self.reset_timeout_ms == 0 {
            return Err(ConfigError::Zero {
                key: ENV_RESET_TIMEOUT,
            });
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::Zero {
                key: ENV_RETRY_ATTEMPTS,
            });
        }
        if self.retry_max_delay_ms < self.retry_initial_delay_ms {
            return Err(ConfigError::DelayCeilingTooLow {
                max_delay_ms: self.retry_max_delay_ms,
                initial_delay_ms: self.retry_initial_delay_ms,
            });
        }
        Ok(())
    }

    /// Breaker configuration derived from these settings.
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new(
            self.failure_threshold,
            Duration::from_millis(self.reset_timeout_ms),
        )
    }

    /// Retry configuration derived from these settings.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_initial_delay_ms),
        )
        .with_max_delay(Duration::from_millis(self.retry_max_delay_ms))
    }
}

fn parse_or<L, N>(lookup: &L, key: &'static str, default: N) -> Result<N, ConfigError>
where
    L: Fn(&str) -> Option<String>,
    N: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber { key, value: raw })
        }
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let settings = ResilienceSettings::from_lookup(|_| None).unwrap();
        assert_eq!(settings, ResilienceSettings::default());
        assert_eq!(settings.failure_threshold, 5);
        assert_eq!(settings.reset_timeout_ms, 30_000);
        assert_eq!(settings.retry_attempts, 3);
        assert_eq!(settings.retry_initial_delay_ms, 1_000);
        assert!(!settings.force_fallback);
    }

    #[test]
    fn environment_overrides_defaults() {
        let settings = ResilienceSettings::from_lookup(lookup_from(&[
            ("CIRCUIT_BREAKER_THRESHOLD", "3"),
            ("CIRCUIT_BREAKER_RESET_TIMEOUT", " 5000 "),
            ("RETRY_ATTEMPTS", "4"),
            ("RETRY_INITIAL_DELAY", "250"),
            ("RETRY_MAX_DELAY", ""),
            ("USE_CBF_MODE", "TRUE"),
        ]))
        .unwrap();

        assert_eq!(settings.failure_threshold, 3);
        assert_eq!(settings.reset_timeout_ms, 5_000);
        assert_eq!(settings.retry_attempts, 4);
        assert_eq!(settings.retry_initial_delay_ms, 250);
        assert_eq!(settings.retry_max_delay_ms, 30_000);
        assert!(settings.force_fallback);

        let retry = settings.retry_config();
        assert_eq!(retry.max_attempts(), 4);
        assert_eq!(retry.initial_delay(), Duration::from_millis(250));
        assert_eq!(
            settings.breaker_config().reset_timeout(),
            Duration::from_millis(5_000)
        );
    }

    #[test]
    fn invalid_numbers_are_reported() {
        let err = ResilienceSettings::from_lookup(lookup_from(&[("RETRY_ATTEMPTS", "three")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                key: ENV_RETRY_ATTEMPTS,
                value: "three".to_string(),
            }
        );
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let err =
            ResilienceSettings::from_lookup(lookup_from(&[("CIRCUIT_BREAKER_THRESHOLD", "0")]))
                .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Zero {
                key: ENV_FAILURE_THRESHOLD
            }
        );
    }

    #[test]
    fn long_initial_delay_raises_default_ceiling() {
        let settings =
            ResilienceSettings::from_lookup(lookup_from(&[("RETRY_INITIAL_DELAY", "60000")]))
                .unwrap();
        assert_eq!(settings.retry_max_delay_ms, 60_000);

        let policy = crate::retry::RetryPolicy::new(settings.retry_config());
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(60));
    }

    #[test]
    fn ceiling_below_initial_delay_is_rejected() {
        let err = ResilienceSettings::from_lookup(lookup_from(&[("RETRY_MAX_DELAY", "0")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::DelayCeilingTooLow {
                max_delay_ms: 0,
                initial_delay_ms: 1_000,
            }
        );

        let settings = ResilienceSettings {
            retry_initial_delay_ms: 2_000,
            retry_max_delay_ms: 1_500,
            ..ResilienceSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn force_fallback_needs_literal_true() {
        let settings =
            ResilienceSettings::from_lookup(lookup_from(&[("USE_CBF_MODE", "1")])).unwrap();
        assert!(!settings.force_fallback);
    }
}
