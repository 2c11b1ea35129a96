#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("upstream error: {0}")]
pub struct TestError(pub String);

impl TestError {
    pub fn new(msg: impl Into<String>) -> Self {
        TestError(msg.into())
    }
}

const ALWAYS: u32 = u32::MAX;

/// Simulated upstream that counts its invocations.
///
/// It fails while `remaining_failures` is non-zero; `u32::MAX` means it never
/// recovers on its own.
#[derive(Clone)]
pub struct Upstream {
    calls: Arc<AtomicU32>,
    remaining_failures: Arc<AtomicU32>,
    latency: Duration,
}

impl Upstream {
    pub fn healthy() -> Self {
        Self::with_failures(0)
    }

    pub fn failing() -> Self {
        Self::with_failures(ALWAYS)
    }

    /// Fails the first `n` calls, then succeeds.
    pub fn flaky(n: u32) -> Self {
        Self::with_failures(n)
    }

    fn with_failures(n: u32) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            remaining_failures: Arc::new(AtomicU32::new(n)),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn recover(&self) {
        self.remaining_failures.store(0, Ordering::SeqCst);
    }

    pub fn break_down(&self) {
        self.remaining_failures.store(ALWAYS, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// One invocation of the upstream; resolves to the call's sequence number.
    pub fn call(&self) -> impl Future<Output = Result<u32, TestError>> + Send + 'static {
        let calls = Arc::clone(&self.calls);
        let remaining = Arc::clone(&self.remaining_failures);
        let latency = self.latency;

        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }

            let fail = remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                    0 => None,
                    ALWAYS => Some(ALWAYS),
                    left => Some(left - 1),
                })
                .is_ok();

            if fail {
                Err(TestError::new(format!("call #{n} failed")))
            } else {
                Ok(n)
            }
        }
    }
}

pub async fn fallback_value() -> Result<u32, TestError> {
    Ok(999)
}
