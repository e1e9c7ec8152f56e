//! Re-exports common types for convenient usage.
//!
//! # Example
//! ```rust,no_run
//! use polly_breaker::prelude::*;
//! ```

pub use crate::{
    BreakCause, BreakerError, BreakerPolicy, BreakerResult, CircuitBreaker, CircuitState, Clock,
    Context, ManualClock, PolicyConfig, RollingWindowPolicy, SystemClock,
};

#[cfg(feature = "async")]
pub use crate::{RetryError, WaitAndRetry};
