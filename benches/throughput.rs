use criterion::{black_box, criterion_group, criterion_main, Criterion};
use polly_breaker::{
    CircuitBreaker, ConsecutiveFailures, ManualClock, PolicyConfig, RollingWindow,
    RollingWindowPolicy, Timestamp,
};
use std::error::Error;
use std::fmt;
use std::time::Duration;

// Custom error type that implements Error trait
#[derive(Debug)]
struct BenchError(String);

impl BenchError {
    fn new(msg: &str) -> Self {
        BenchError(msg.to_string())
    }
}

impl fmt::Display for BenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Benchmark error: {}", self.0)
    }
}

impl Error for BenchError {}

fn successful_operation() -> Result<(), BenchError> {
    Ok(())
}

fn failing_operation() -> Result<(), BenchError> {
    Err(BenchError::new("Simulated failure"))
}

fn bench_circuit_breaker_closed(c: &mut Criterion) {
    let policy = RollingWindowPolicy::new(0.5, Duration::from_secs(10), 20).unwrap();
    let breaker = CircuitBreaker::<_, BenchError>::builder(policy)
        .break_duration(Duration::from_secs(30))
        .build();

    c.bench_function("circuit_breaker_closed_success", |b| {
        b.iter(|| black_box(breaker.call(successful_operation)));
    });
}

fn bench_circuit_breaker_transition(c: &mut Criterion) {
    let breaker = CircuitBreaker::<_, BenchError>::builder(ConsecutiveFailures::new(5).unwrap())
        .clock(ManualClock::new())
        .break_duration(Duration::from_secs(30))
        .build();

    c.bench_function("circuit_breaker_transition", |b| {
        b.iter_custom(|iters| {
            let start = std::time::Instant::now();

            for _ in 0..iters {
                // Reset to ensure consistent starting point
                breaker.reset();

                // Make 5 failing calls to trip the breaker
                for _ in 0..5 {
                    let _ = black_box(breaker.call(failing_operation));
                }

                // One open-circuit rejection
                let _ = black_box(breaker.call(successful_operation));
            }

            start.elapsed()
        });
    });
}

fn bench_rolling_window_record(c: &mut Criterion) {
    let mut window = RollingWindow::new(Duration::from_secs(10));
    let mut now = Timestamp::ZERO;

    c.bench_function("rolling_window_record", |b| {
        b.iter(|| {
            now = now.saturating_add(Duration::from_millis(7));
            window.record_failure(now);
            black_box(window.counts(now))
        });
    });
}

fn bench_circuit_breaker_concurrent(c: &mut Criterion) {
    use std::sync::{Arc, Barrier};
    use std::thread;

    let policy = PolicyConfig::ConsecutiveCount { threshold: 100 }
        .build()
        .unwrap();
    let breaker = CircuitBreaker::<_, BenchError>::builder(policy).build();

    const THREAD_COUNT: usize = 4;
    const ITERATIONS_PER_THREAD: usize = 1000;

    c.bench_function("circuit_breaker_concurrent", |b| {
        b.iter(|| {
            let barrier = Arc::new(Barrier::new(THREAD_COUNT + 1));
            let mut handles = Vec::with_capacity(THREAD_COUNT);

            for _ in 0..THREAD_COUNT {
                let thread_breaker = breaker.clone();
                let thread_barrier = Arc::clone(&barrier);

                handles.push(thread::spawn(move || {
                    thread_barrier.wait();
                    for _ in 0..ITERATIONS_PER_THREAD {
                        let _ = black_box(thread_breaker.call(successful_operation));
                    }
                }));
            }

            // Start all threads simultaneously
            barrier.wait();

            // Wait for all threads to complete
            for handle in handles {
                handle.join().unwrap();
            }
        });
    });
}

criterion_group!(
    benches,
    bench_circuit_breaker_closed,
    bench_circuit_breaker_transition,
    bench_rolling_window_record,
    bench_circuit_breaker_concurrent
);
criterion_main!(benches);
