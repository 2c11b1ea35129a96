//! Degraded-mode Example
//!
//! A gateway-style handler serves quotes from an upstream provider through the
//! shared [`ResilienceService`], and falls back to cached data while the
//! provider is down. Settings come from the environment, so the demo also
//! runs in forced fallback mode with `USE_CBF_MODE=true`.
//!
//! ```text
//! RUST_LOG=resilience_rs=debug cargo run --example degraded
//! ```

use resilience_rs::{ResilienceFactory, ResilienceService, ValueSource};
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
struct ProviderError(&'static str);

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider error: {}", self.0)
    }
}

impl Error for ProviderError {}

struct QuoteProvider {
    available: AtomicBool,
}

impl QuoteProvider {
    async fn latest_price(&self) -> Result<f64, ProviderError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if self.available.load(Ordering::SeqCst) {
            Ok(101.25)
        } else {
            Err(ProviderError("connection refused"))
        }
    }
}

async fn cached_price() -> Result<f64, ProviderError> {
    Ok(99.80)
}

async fn handle_request(service: &ResilienceService, provider: &QuoteProvider, request: u32) {
    let report = service
        .execute_reported(|| provider.latest_price(), Some(cached_price))
        .await;

    let source = match report.source {
        ValueSource::Primary => "live",
        ValueSource::Fallback => "cached",
    };
    match report.result {
        Ok(price) => println!(
            "request {request:>2}: {price:.2} ({source}, {} upstream attempts, circuit {})",
            report.attempts, report.circuit_state
        ),
        Err(err) => println!("request {request:>2}: failed: {err}"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut settings = resilience_rs::ResilienceSettings::from_env()?;
    settings.failure_threshold = settings.failure_threshold.min(3);
    settings.reset_timeout_ms = settings.reset_timeout_ms.min(2_000);
    settings.retry_initial_delay_ms = settings.retry_initial_delay_ms.min(100);

    let factory = Arc::new(ResilienceFactory::new(settings));
    let service = ResilienceService::new(Arc::clone(&factory));
    let provider = QuoteProvider {
        available: AtomicBool::new(true),
    };

    println!("{}", serde_json::to_string_pretty(&service.status())?);

    for request in 1..=12 {
        if request == 3 {
            println!("-- provider goes down");
            provider.available.store(false, Ordering::SeqCst);
        }
        if request == 9 {
            println!("-- provider recovers, waiting out the cooldown");
            provider.available.store(true, Ordering::SeqCst);
            tokio::time::sleep(factory.settings().breaker_config().reset_timeout()).await;
        }

        handle_request(&service, &provider, request).await;
        println!("   status: {}", service.status().status_message);
    }

    println!("{}", serde_json::to_string_pretty(&service.status())?);
    Ok(())
}
