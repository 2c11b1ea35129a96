use criterion::{black_box, criterion_group, criterion_main, Criterion};
use resilience_rs::{CircuitBreaker, RetryPolicy};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

#[derive(Debug)]
struct BenchError(&'static str);

impl fmt::Display for BenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Benchmark error: {}", self.0)
    }
}

impl std::error::Error for BenchError {}

async fn successful_operation() -> Result<(), BenchError> {
    Ok(())
}

async fn failing_operation() -> Result<(), BenchError> {
    Err(BenchError("Simulated failure"))
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .expect("benchmark runtime")
}

fn bench_circuit_breaker_closed(c: &mut Criterion) {
    let rt = runtime();
    let breaker = CircuitBreaker::builder()
        .failure_threshold(5)
        .reset_timeout(Duration::from_secs(30))
        .build();

    c.bench_function("circuit_breaker_closed_success", |b| {
        b.iter(|| rt.block_on(async { black_box(breaker.call(successful_operation).await) }));
    });
}

fn bench_circuit_breaker_open(c: &mut Criterion) {
    let rt = runtime();
    let breaker = CircuitBreaker::builder()
        .failure_threshold(1)
        .reset_timeout(Duration::from_secs(3600))
        .build();
    let _ = rt.block_on(breaker.call(failing_operation));

    c.bench_function("circuit_breaker_open_rejection", |b| {
        b.iter(|| rt.block_on(async { black_box(breaker.call(successful_operation).await) }));
    });
}

fn bench_circuit_breaker_transition(c: &mut Criterion) {
    let rt = runtime();
    let breaker = CircuitBreaker::builder()
        .failure_threshold(5)
        .reset_timeout(Duration::from_secs(30))
        .build();

    c.bench_function("circuit_breaker_transition", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let start = std::time::Instant::now();

                for _ in 0..iters {
                    breaker.reset();

                    // Five failures trip the breaker, the sixth call is rejected
                    for _ in 0..6 {
                        let _ = black_box(breaker.call(failing_operation).await);
                    }
                }

                start.elapsed()
            })
        });
    });
}

fn bench_circuit_breaker_concurrent(c: &mut Criterion) {
    const TASK_COUNT: usize = 4;
    const ITERATIONS_PER_TASK: usize = 1000;

    let rt = runtime();
    let breaker = CircuitBreaker::builder()
        .failure_threshold(100)
        .reset_timeout(Duration::from_secs(30))
        .build();

    c.bench_function("circuit_breaker_concurrent", |b| {
        b.iter(|| {
            rt.block_on(async {
                let barrier = Arc::new(tokio::sync::Barrier::new(TASK_COUNT));
                let mut handles = Vec::with_capacity(TASK_COUNT);

                for _ in 0..TASK_COUNT {
                    let breaker = breaker.clone();
                    let barrier = Arc::clone(&barrier);

                    handles.push(tokio::spawn(async move {
                        barrier.wait().await;
                        for _ in 0..ITERATIONS_PER_TASK {
                            let _ = black_box(breaker.call(successful_operation).await);
                        }
                    }));
                }

                for joined in futures::future::join_all(handles).await {
                    joined.expect("benchmark task");
                }
            })
        });
    });
}

fn bench_retry_first_attempt(c: &mut Criterion) {
    let rt = runtime();
    let policy = RetryPolicy::builder().max_attempts(3).build();

    c.bench_function("retry_first_attempt_success", |b| {
        b.iter(|| rt.block_on(async { black_box(policy.execute(successful_operation).await) }));
    });
}

criterion_group!(
    benches,
    bench_circuit_breaker_closed,
    bench_circuit_breaker_open,
    bench_circuit_breaker_transition,
    bench_circuit_breaker_concurrent,
    bench_retry_first_attempt
);
criterion_main!(benches);
