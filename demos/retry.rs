//! Retrying through a circuit breaker, with cancellation.
//!
//! Run with `--features async`.

use polly_breaker::{BreakerError, CircuitBreaker, ConsecutiveFailures, Context, WaitAndRetry};
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct ServiceError(u32);

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service error on attempt {}", self.0)
    }
}

impl Error for ServiceError {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("polly_breaker=debug")
        .init();

    let breaker = CircuitBreaker::<_, ServiceError>::builder(ConsecutiveFailures::new(4)?)
        .name("payments")
        .break_duration(Duration::from_millis(200))
        .build();

    // Retry with exponential backoff, but never past an open circuit
    let retry = WaitAndRetry::with_provider(5, |retry| Duration::from_millis(50 * 2u64.pow(retry)))
        .handle(|err: &BreakerError<ServiceError>| !err.is_rejection())
        .on_retry(|err, wait, _: &mut Context| println!("retrying in {:?} after: {}", wait, err));

    let token = CancellationToken::new();
    let attempts = Arc::new(AtomicU32::new(0));

    let result = retry
        .execute(&token, || {
            let breaker = breaker.clone();
            let attempts = Arc::clone(&attempts);
            async move {
                breaker
                    .call_async(|| async move {
                        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                        if attempt < 3 {
                            Err(ServiceError(attempt))
                        } else {
                            Ok(format!("charged on attempt {}", attempt))
                        }
                    })
                    .await
            }
        })
        .await;

    println!("result: {:?}", result);
    println!("breaker state: {}", breaker.current_state());

    // A cancelled token stops the retry loop before the next attempt
    token.cancel();
    let cancelled = retry
        .execute(&token, || async {
            Ok::<_, BreakerError<ServiceError>>("never runs")
        })
        .await;
    println!("after cancellation: {:?}", cancelled);

    Ok(())
}
