//! # polly-breaker
//!
//! A resilience engine built around a thread-safe circuit breaker with
//! pluggable failure-detection policies and an injectable clock.
//!
//! ## What is a Circuit Breaker?
//!
//! The Circuit Breaker pattern helps prevent cascading failures by failing
//! fast once an operation has been failing too often. A breaker moves between
//! four states:
//!
//! - **Closed**: Normal operation. Calls pass through and their outcomes are
//!   fed to the breaker's policy.
//! - **Open**: The policy decided the operation is unhealthy. Calls are
//!   rejected with [`BreakerError::BrokenCircuit`] carrying the last fault.
//! - **Half-Open**: The break duration has elapsed. A single trial call is let
//!   through; its success closes the circuit and its failure re-opens it.
//! - **Isolated**: The circuit was opened by hand and stays open until reset.
//!
//! ## Basic Usage
//!
//! ```rust
//! use polly_breaker::{BreakerError, CircuitBreaker, RollingWindowPolicy};
//! use std::error::Error;
//! use std::fmt;
//! use std::time::Duration;
//!
//! #[derive(Debug)]
//! struct ServiceError(String);
//!
//! impl fmt::Display for ServiceError {
//!     fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
//!         write!(f, "Service error: {}", self.0)
//!     }
//! }
//!
//! impl Error for ServiceError {}
//!
//! // Break when half of the calls in the last ten seconds failed, once at least
//! // four calls have been seen.
//! let policy = RollingWindowPolicy::new(0.5, Duration::from_secs(10), 4).unwrap();
//!
//! let breaker = CircuitBreaker::<_, ServiceError>::builder(policy)
//!     .break_duration(Duration::from_secs(30))
//!     .build();
//!
//! match breaker.call(|| Ok::<_, ServiceError>("Success".to_string())) {
//!     Ok(result) => println!("Call succeeded: {}", result),
//!     Err(BreakerError::BrokenCircuit(last)) => println!("Circuit is open after: {}", last),
//!     Err(BreakerError::Isolated) => println!("Circuit is isolated"),
//!     Err(BreakerError::Operation(err)) => println!("Call failed: {}", err),
//! }
//! ```
//!
//! ## Deterministic time
//!
//! Every time-based decision goes through the breaker's [`Clock`]. Tests
//! inject a [`ManualClock`] and advance it instead of sleeping.
//!
//! ## Features
//!
//! - `async` - `call_async` and the [`WaitAndRetry`] policy, on Tokio

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod breaker;
mod clock;
mod config;
mod context;
mod error;
mod hook;
mod metrics;
mod policy;
pub mod prelude;
#[cfg(feature = "async")]
mod retry;
mod state;

// Re-exports
pub use breaker::CircuitBreaker;
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use config::{BreakerBuilder, PolicyConfig};
pub use context::Context;
#[cfg(feature = "async")]
pub use error::RetryError;
pub use error::{BreakerError, BreakerResult, ConfigError};
pub use hook::{BreakCause, HookRegistry};
pub use metrics::{HealthCounts, MetricSink, NullMetricSink, OutcomeRing, RollingWindow};
pub use policy::{
    AnyPolicy, BreakerPolicy, ConsecutiveFailures, FailureProportion, FrequencyAverage,
    RollingWindowPolicy, TimestampWindow,
};
#[cfg(feature = "async")]
pub use retry::WaitAndRetry;
pub use state::CircuitState;
