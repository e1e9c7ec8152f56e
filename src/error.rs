//! Error types for the circuit breaker library.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Result type for circuit breaker operations.
pub type BreakerResult<T, E> = Result<T, BreakerError<E>>;

/// Error type for calls made through a circuit breaker.
#[derive(Debug, Error)]
pub enum BreakerError<E>
where
    E: std::error::Error + 'static,
{
    /// The circuit is open; the call was not attempted.
    ///
    /// Carries the last fault observed by the breaker.
    #[error("The circuit is now open and is not allowing calls.")]
    BrokenCircuit(#[source] Arc<E>),

    /// The circuit has been manually isolated; the call was not attempted.
    #[error("The circuit is manually held open and is not allowing calls.")]
    Isolated,

    /// The underlying operation failed.
    #[error("Operation error: {0}")]
    Operation(#[source] Arc<E>),
}

impl<E> BreakerError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns true if the call was rejected without being attempted.
    pub fn is_rejection(&self) -> bool {
        matches!(self, BreakerError::BrokenCircuit(_) | BreakerError::Isolated)
    }

    /// The operation fault this error carries, if any.
    pub fn fault(&self) -> Option<&Arc<E>> {
        match self {
            BreakerError::BrokenCircuit(fault) | BreakerError::Operation(fault) => Some(fault),
            BreakerError::Isolated => None,
        }
    }
}

/// Invalid construction parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A numeric parameter lies outside its accepted range.
    #[error("{parameter} is out of range: {reason}")]
    OutOfRange {
        /// Name of the offending parameter.
        parameter: &'static str,
        /// Human-readable constraint that was violated.
        reason: &'static str,
    },

    /// A duration parameter must be strictly positive.
    #[error("{parameter} must be greater than zero, got {value:?}")]
    NonPositiveDuration {
        /// Name of the offending parameter.
        parameter: &'static str,
        /// The rejected value.
        value: Duration,
    },
}

impl ConfigError {
    /// Name of the parameter that failed validation.
    pub fn parameter(&self) -> &'static str {
        match self {
            ConfigError::OutOfRange { parameter, .. }
            | ConfigError::NonPositiveDuration { parameter, .. } => parameter,
        }
    }

    pub(crate) fn out_of_range(parameter: &'static str, reason: &'static str) -> Self {
        ConfigError::OutOfRange { parameter, reason }
    }

    pub(crate) fn require_positive(parameter: &'static str, value: Duration) -> Result<(), Self> {
        if value.is_zero() {
            Err(ConfigError::NonPositiveDuration { parameter, value })
        } else {
            Ok(())
        }
    }
}

/// Error type for executions through a [`WaitAndRetry`](crate::WaitAndRetry) policy.
#[cfg(feature = "async")]
#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// The operation failed and no further retry was made.
    #[error("Operation error: {0}")]
    Operation(#[source] E),

    /// Cancellation was requested before the execution could complete.
    #[error("The operation was cancelled")]
    Cancelled,
}
