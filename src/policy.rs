//! Failure-detection policies deciding when a circuit should break.
//!
//! A breaker owns exactly one policy. The breaker feeds it every handled
//! outcome observed while the circuit is closed, asks it after each failure
//! whether the break threshold has been met, and resets it whenever the
//! circuit breaks or closes so that the next evaluation starts clean.

use std::collections::VecDeque;
use std::time::Duration;

use crate::clock::Timestamp;
use crate::error::ConfigError;
use crate::metrics::{HealthCounts, OutcomeRing, RollingWindow};

/// A policy that determines when to break a circuit.
///
/// Every method receives the time at which the breaker observed the event, so
/// implementations never read a clock themselves.
pub trait BreakerPolicy: Send + 'static {
    /// Records a successful call.
    fn record_success(&mut self, now: Timestamp);

    /// Records a failed call.
    fn record_failure(&mut self, now: Timestamp);

    /// Determines if the circuit should break given everything recorded so far.
    fn should_break(&mut self, now: Timestamp) -> bool;

    /// Forgets everything recorded.
    fn reset(&mut self);
}

/// Breaks after a run of consecutive failures.
#[derive(Debug, Clone)]
pub struct ConsecutiveFailures {
    threshold: u32,
    count: u32,
}

impl ConsecutiveFailures {
    /// Creates a policy breaking once `threshold` failures occur without an intervening success.
    pub fn new(threshold: u32) -> Result<Self, ConfigError> {
        if threshold == 0 {
            return Err(ConfigError::out_of_range(
                "exceptions_allowed_before_breaking",
                "value must be greater than zero",
            ));
        }

        Ok(Self { threshold, count: 0 })
    }

    /// Failures counted in the current run.
    pub fn count(&self) -> u32 {
        self.count
    }
}

impl BreakerPolicy for ConsecutiveFailures {
    fn record_success(&mut self, _now: Timestamp) {
        self.count = 0;
    }

    fn record_failure(&mut self, _now: Timestamp) {
        self.count = self.count.saturating_add(1);
    }

    fn should_break(&mut self, _now: Timestamp) -> bool {
        self.count >= self.threshold
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

/// Breaks when failures arrive more often, on average, than `threshold` per relevance window.
///
/// Keeps a running average of the gap between consecutive failures. A gap
/// longer than the relevance window means the threshold frequency cannot have
/// been met, so the history is dropped and the new failure starts a fresh
/// series. This also keeps a long idle period from skewing the average.
#[derive(Debug, Clone)]
pub struct FrequencyAverage {
    threshold: u32,
    relevance: Duration,
    max_average_gap: Duration,
    count: u32,
    average_gap: Duration,
    last_failure: Option<Timestamp>,
}

impl FrequencyAverage {
    /// Creates a policy breaking on `threshold` failures per `relevance`.
    pub fn new(threshold: u32, relevance: Duration) -> Result<Self, ConfigError> {
        if threshold < 2 {
            return Err(ConfigError::out_of_range(
                "exceptions_allowed_before_breaking",
                "value must be two or more to break on exception frequency",
            ));
        }
        ConfigError::require_positive("duration_of_exception_relevance", relevance)?;

        Ok(Self {
            threshold,
            relevance,
            max_average_gap: relevance / (threshold - 1),
            count: 0,
            average_gap: Duration::ZERO,
            last_failure: None,
        })
    }

    /// Current running average of the gap between failures.
    pub fn average_gap(&self) -> Duration {
        self.average_gap
    }
}

impl BreakerPolicy for FrequencyAverage {
    fn record_success(&mut self, _now: Timestamp) {}

    fn record_failure(&mut self, now: Timestamp) {
        let gap = self
            .last_failure
            .map(|last| now.saturating_duration_since(last))
            .filter(|gap| *gap <= self.relevance);

        match gap {
            Some(gap) => {
                if self.count < self.threshold {
                    self.count += 1;
                }

                // Weighted so that, once the count saturates, older gaps decay geometrically.
                let weight = u128::from(self.count - 2);
                let total = self.average_gap.as_nanos() * weight + gap.as_nanos();
                let average = total / u128::from(self.count - 1);
                self.average_gap = Duration::from_nanos(u64::try_from(average).unwrap_or(u64::MAX));
            }
            None => {
                self.count = 1;
                self.average_gap = Duration::ZERO;
            }
        }

        self.last_failure = Some(now);
    }

    fn should_break(&mut self, _now: Timestamp) -> bool {
        self.count >= self.threshold && self.average_gap < self.max_average_gap
    }

    fn reset(&mut self) {
        self.count = 0;
        self.average_gap = Duration::ZERO;
        self.last_failure = None;
    }
}

/// Breaks when too many of the most recent calls failed.
///
/// Nothing is decided until the ring has seen `in_total_call_count` calls.
#[derive(Debug, Clone)]
pub struct FailureProportion {
    allowed: usize,
    outcomes: OutcomeRing,
}

impl FailureProportion {
    /// Creates a policy breaking on `allowed` or more failures in any `in_total_call_count` calls.
    pub fn new(allowed: usize, in_total_call_count: usize) -> Result<Self, ConfigError> {
        if allowed == 0 {
            return Err(ConfigError::out_of_range(
                "exceptions_allowed_before_breaking",
                "value must be greater than zero",
            ));
        }
        if allowed >= in_total_call_count {
            return Err(ConfigError::out_of_range(
                "in_total_call_count",
                "value must be greater than exceptions_allowed_before_breaking",
            ));
        }

        Ok(Self {
            allowed,
            outcomes: OutcomeRing::new(in_total_call_count),
        })
    }

    /// Failures among the remembered calls.
    pub fn failures(&self) -> usize {
        self.outcomes.failures()
    }
}

impl BreakerPolicy for FailureProportion {
    fn record_success(&mut self, _now: Timestamp) {
        self.outcomes.push(false);
    }

    fn record_failure(&mut self, _now: Timestamp) {
        self.outcomes.push(true);
    }

    fn should_break(&mut self, _now: Timestamp) -> bool {
        // A partly filled ring says too little about the proportion.
        self.outcomes.is_full() && self.outcomes.failures() >= self.allowed
    }

    fn reset(&mut self) {
        self.outcomes.clear();
    }
}

/// Breaks when `threshold` failures all fall within one relevance window.
#[derive(Debug, Clone)]
pub struct TimestampWindow {
    threshold: usize,
    relevance: Duration,
    failures: VecDeque<Timestamp>,
}

impl TimestampWindow {
    /// Creates a policy breaking when `threshold` failures occur within `relevance`.
    pub fn new(threshold: usize, relevance: Duration) -> Result<Self, ConfigError> {
        if threshold < 2 {
            return Err(ConfigError::out_of_range(
                "exceptions_allowed_before_breaking",
                "value must be two or more to break on exception frequency",
            ));
        }
        ConfigError::require_positive("duration_of_exception_relevance", relevance)?;

        Ok(Self {
            threshold,
            relevance,
            failures: VecDeque::with_capacity(threshold),
        })
    }
}

impl BreakerPolicy for TimestampWindow {
    fn record_success(&mut self, _now: Timestamp) {}

    fn record_failure(&mut self, now: Timestamp) {
        self.failures.push_back(now);
        while self.failures.len() > self.threshold {
            self.failures.pop_front();
        }
    }

    fn should_break(&mut self, _now: Timestamp) -> bool {
        if self.failures.len() < self.threshold {
            return false;
        }

        match (self.failures.front(), self.failures.back()) {
            (Some(oldest), Some(newest)) => *oldest >= newest.saturating_sub(self.relevance),
            _ => false,
        }
    }

    fn reset(&mut self) {
        self.failures.clear();
    }
}

/// Breaks when the failure ratio over a trailing time window reaches a threshold.
///
/// The window is only evaluated once it has seen `minimum_throughput` calls,
/// so a handful of early failures cannot break the circuit on their own.
#[derive(Debug, Clone)]
pub struct RollingWindowPolicy {
    failure_threshold: f64,
    minimum_throughput: u64,
    window: RollingWindow,
}

impl RollingWindowPolicy {
    /// Creates a rolling-window policy.
    ///
    /// `failure_threshold` must lie in `(0, 1]`, `timeslice_duration` must be
    /// positive and `minimum_throughput` at least one.
    pub fn new(
        failure_threshold: f64,
        timeslice_duration: Duration,
        minimum_throughput: u64,
    ) -> Result<Self, ConfigError> {
        if !(failure_threshold > 0.0 && failure_threshold <= 1.0) {
            return Err(ConfigError::out_of_range(
                "failure_threshold",
                "value must be greater than zero and no greater than one",
            ));
        }
        ConfigError::require_positive("timeslice_duration", timeslice_duration)?;
        if minimum_throughput == 0 {
            return Err(ConfigError::out_of_range(
                "minimum_throughput",
                "value must be greater than zero",
            ));
        }

        Ok(Self {
            failure_threshold,
            minimum_throughput,
            window: RollingWindow::new(timeslice_duration),
        })
    }

    /// Totals over the live part of the window at `now`.
    pub fn health(&mut self, now: Timestamp) -> HealthCounts {
        self.window.counts(now)
    }
}

impl BreakerPolicy for RollingWindowPolicy {
    fn record_success(&mut self, now: Timestamp) {
        self.window.record_success(now);
    }

    fn record_failure(&mut self, now: Timestamp) {
        self.window.record_failure(now);
    }

    fn should_break(&mut self, now: Timestamp) -> bool {
        let health = self.window.counts(now);

        health.throughput() >= self.minimum_throughput
            && health.failure_ratio() >= self.failure_threshold
    }

    fn reset(&mut self) {
        self.window.clear();
    }
}

/// Any one of the built-in policies, chosen at construction time.
#[derive(Debug, Clone)]
pub enum AnyPolicy {
    /// See [`ConsecutiveFailures`].
    ConsecutiveFailures(ConsecutiveFailures),
    /// See [`FrequencyAverage`].
    FrequencyAverage(FrequencyAverage),
    /// See [`FailureProportion`].
    FailureProportion(FailureProportion),
    /// See [`TimestampWindow`].
    TimestampWindow(TimestampWindow),
    /// See [`RollingWindowPolicy`].
    RollingWindow(RollingWindowPolicy),
}

impl AnyPolicy {
    fn as_policy(&mut self) -> &mut dyn BreakerPolicy {
        match self {
            AnyPolicy::ConsecutiveFailures(policy) => policy,
            AnyPolicy::FrequencyAverage(policy) => policy,
            AnyPolicy::FailureProportion(policy) => policy,
            AnyPolicy::TimestampWindow(policy) => policy,
            AnyPolicy::RollingWindow(policy) => policy,
        }
    }
}

impl BreakerPolicy for AnyPolicy {
    fn record_success(&mut self, now: Timestamp) {
        self.as_policy().record_success(now);
    }

    fn record_failure(&mut self, now: Timestamp) {
        self.as_policy().record_failure(now);
    }

    fn should_break(&mut self, now: Timestamp) -> bool {
        self.as_policy().should_break(now)
    }

    fn reset(&mut self) {
        self.as_policy().reset();
    }
}
