use polly_breaker::{BreakerError, CircuitBreaker, ConsecutiveFailures};
use std::error::Error;
use std::fmt;
use std::thread;
use std::time::Duration;

// Custom error type that implements Error trait
#[derive(Debug)]
struct ServiceError(String);

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service error: {}", self.0)
    }
}

impl Error for ServiceError {}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("polly_breaker=debug")
        .init();

    // Break after three failures in a row and stay open for two seconds
    let breaker = CircuitBreaker::<_, ServiceError>::builder(ConsecutiveFailures::new(3)?)
        .name("inventory")
        .break_duration(Duration::from_secs(2))
        .build();

    println!("Circuit initial state: {}", breaker.current_state());

    let mut counter = 0u32;
    let mut call_service = || -> Result<String, ServiceError> {
        counter += 1;
        if (3..=7).contains(&counter) {
            Err(ServiceError("External service error".to_string()))
        } else {
            Ok(format!("response #{}", counter))
        }
    };

    for i in 1..=12 {
        println!("\nAttempt {}: ", i);

        match breaker.call(&mut call_service) {
            Ok(result) => println!("Call succeeded with result: {}", result),
            Err(BreakerError::BrokenCircuit(last)) => {
                println!("Circuit is open after \"{}\", waiting before retry...", last);
                thread::sleep(Duration::from_secs(1));
            }
            Err(BreakerError::Isolated) => println!("Circuit is isolated"),
            Err(BreakerError::Operation(err)) => println!("Call failed with error: {}", err),
        }

        println!("Current state: {}", breaker.current_state());
        thread::sleep(Duration::from_millis(300));
    }

    Ok(())
}
