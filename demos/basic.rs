//! Basic Circuit Breaker Example
//!
//! A breaker wraps a flaky service: it trips after three failures in a row,
//! rejects calls during the cooldown, then lets one trial call through.

use resilience_rs::{BreakerError, CircuitBreaker, HookRegistry};
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[derive(Debug)]
struct ServiceError(String);

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service error: {}", self.0)
    }
}

impl Error for ServiceError {}

// Calls 4 through 8 fail, everything else succeeds
async fn call_service(counter: &AtomicU32) -> Result<String, ServiceError> {
    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
    tokio::time::sleep(Duration::from_millis(20)).await;

    if (4..=8).contains(&n) {
        Err(ServiceError(format!("request {n} timed out")))
    } else {
        Ok(format!("response {n}"))
    }
}

#[tokio::main]
async fn main() {
    let hooks = HookRegistry::new();
    hooks.set_on_open(|from| println!("  >> circuit OPENED (was {from})"));
    hooks.set_on_half_open(|_| println!("  >> circuit HALF-OPEN, sending a trial call"));
    hooks.set_on_close(|_| println!("  >> circuit CLOSED, service recovered"));

    let breaker = CircuitBreaker::builder()
        .failure_threshold(3)
        .reset_timeout(Duration::from_secs(2))
        .hooks(hooks)
        .build();

    println!("Circuit initial state: {}", breaker.state());

    let counter = AtomicU32::new(0);

    for i in 1..=15 {
        println!("\nAttempt {i}:");

        match breaker.call(|| call_service(&counter)).await {
            Ok(result) => println!("Call succeeded with result: {result}"),
            Err(BreakerError::Open) => println!("Circuit is open, call not attempted"),
            Err(BreakerError::Operation(err)) => println!("Call failed with error: {err}"),
            Err(err) => println!("Other error: {err}"),
        }

        let stats = breaker.stats();
        println!(
            "Current state: {}, failures in a row: {}, error rate: {:.2}",
            breaker.state(),
            breaker.consecutive_failures(),
            stats.error_rate()
        );

        tokio::time::sleep(Duration::from_millis(300)).await;
    }
}
