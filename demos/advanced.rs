//! Advanced Circuit Breaker Example
//!
//! This example demonstrates:
//! 1. Choosing a failure-detection policy from configuration
//! 2. Driving time with a manual clock instead of sleeping
//! 3. Using hooks and a shared context for monitoring circuit breaker events
//! 4. Isolating and resetting a circuit by hand

use polly_breaker::{
    BreakerError, CircuitBreaker, CircuitState, Clock, Context, ManualClock, MetricSink,
    PolicyConfig,
};
use std::error::Error;
use std::fmt;
use std::time::Duration;

// Custom error type that implements Error trait
#[derive(Debug)]
struct ServiceError(String);

impl ServiceError {
    fn new(msg: &str) -> Self {
        ServiceError(msg.to_string())
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service error: {}", self.0)
    }
}

impl Error for ServiceError {}

/// Prints every transition the breaker reports.
struct ConsoleSink;

impl MetricSink for ConsoleSink {
    fn record_state_transition(&self, from: CircuitState, to: CircuitState) {
        println!("[metrics] {} -> {}", from, to);
    }

    fn record_rejection(&self, state: CircuitState) {
        println!("[metrics] rejected while {}", state);
    }

    fn record_probe_attempt(&self, admitted: bool) {
        println!("[metrics] probe admitted: {}", admitted);
    }

    fn record_call(&self, _success: bool, _duration: Duration) {}
}

// A function that simulates an external service with varying failure patterns
fn external_service_call(call: u32) -> Result<String, ServiceError> {
    match call {
        1..=3 => Ok("Initial success".to_string()),
        4..=8 => Err(ServiceError::new("Service temporarily unavailable")),
        _ => Ok("Service recovered".to_string()),
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    println!("=== Advanced Circuit Breaker Example ===\n");

    // 1. Break when at least half of the calls in the last ten seconds failed
    let policy = PolicyConfig::RollingWindow {
        failure_threshold: 0.5,
        timeslice_duration: Duration::from_secs(10),
        minimum_throughput: 6,
    }
    .build()?;

    // 2. A manual clock lets the example skip the break without sleeping
    let clock = ManualClock::new();
    let breaker = CircuitBreaker::<_, ServiceError>::builder(policy)
        .name("catalog")
        .clock(clock.clone())
        .break_duration(Duration::from_secs(5))
        .metric_sink(ConsoleSink)
        .on_break(|cause, duration, context: &mut Context| {
            println!(
                "Circuit OPENED by {} for {:?} (operation {:?})",
                cause,
                duration,
                context.operation_key()
            );
        })
        .on_reset(|context| {
            println!("Circuit CLOSED (operation {:?})", context.operation_key());
        })
        .on_half_open(|| println!("Circuit HALF-OPEN, testing if service recovered"))
        .build();

    println!("Initial state: {}\n", breaker.current_state());

    // 3. Simulate a series of calls, one second apart
    for i in 1..=12 {
        println!("\n--- Call {} at {} ---", i, clock.now());

        let mut context = Context::with_operation_key("list-products");
        match breaker.call_with_context(&mut context, || external_service_call(i)) {
            Ok(response) => println!("Service response: {}", response),
            Err(BreakerError::BrokenCircuit(last)) => {
                println!("Circuit open, call not attempted (last fault: {})", last)
            }
            Err(BreakerError::Isolated) => println!("Circuit isolated, call not attempted"),
            Err(BreakerError::Operation(err)) => println!("Service error: {}", err),
        }

        println!("State: {}", breaker.current_state());
        clock.advance(Duration::from_secs(1));
    }

    // 4. Take the dependency out of rotation, then bring it back
    breaker.isolate();
    println!("\nAfter isolate: {}", breaker.current_state());
    clock.advance(Duration::from_secs(60));
    println!("Still isolated a minute later: {}", breaker.current_state());
    breaker.reset();
    println!("After reset: {}", breaker.current_state());

    println!("\n=== Example Completed ===");
    Ok(())
}
