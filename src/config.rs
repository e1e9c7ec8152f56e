//! Configuration for circuit breakers.

use std::sync::Arc;
use std::time::Duration;

use crate::breaker::{CircuitBreaker, FaultPredicate};
use crate::clock::{Clock, SystemClock};
use crate::context::Context;
use crate::error::ConfigError;
use crate::hook::{BreakCause, HookRegistry};
use crate::metrics::{MetricSink, NullMetricSink};
use crate::policy::{
    AnyPolicy, BreakerPolicy, ConsecutiveFailures, FailureProportion, FrequencyAverage,
    RollingWindowPolicy, TimestampWindow,
};

/// Builder for creating circuit breakers with custom configurations.
pub struct BreakerBuilder<P, E>
where
    P: BreakerPolicy,
    E: std::error::Error + Send + Sync + 'static,
{
    name: String,
    policy: P,
    break_duration: Duration,
    clock: Arc<dyn Clock>,
    handles: FaultPredicate<E>,
    metric_sink: Arc<dyn MetricSink>,
    hook_registry: HookRegistry<E>,
}

impl<P, E> BreakerBuilder<P, E>
where
    P: BreakerPolicy,
    E: std::error::Error + Send + Sync + 'static,
{
    /// Creates a new builder with default settings around `policy`.
    ///
    /// Defaults: a 30 second break, the system clock, every fault handled,
    /// no hooks and no metrics.
    pub fn new(policy: P) -> Self {
        Self {
            name: String::from("default"),
            policy,
            break_duration: Duration::from_secs(30),
            clock: Arc::new(SystemClock),
            handles: Arc::new(|_: &E| true),
            metric_sink: Arc::new(NullMetricSink),
            hook_registry: HookRegistry::new(),
        }
    }

    /// Sets the name reported in log events.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets how long the circuit stays open after breaking.
    ///
    /// Durations that would run past the end of representable time hold the
    /// circuit open indefinitely.
    pub fn break_duration(mut self, duration: Duration) -> Self {
        self.break_duration = duration;
        self
    }

    /// Sets the clock used for every time-based decision.
    pub fn clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Restricts which faults count against the circuit.
    ///
    /// Faults for which `predicate` returns false are passed back to the
    /// caller without being reported to the breaker.
    pub fn handle<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.handles = Arc::new(predicate);
        self
    }

    /// Sets a metric sink for the circuit breaker.
    pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.metric_sink = Arc::new(sink);
        self
    }

    /// Sets a hook registry for the circuit breaker, replacing any hooks set so far.
    pub fn hooks(mut self, hooks: HookRegistry<E>) -> Self {
        self.hook_registry = hooks;
        self
    }

    /// Sets the hook called when the circuit breaks.
    pub fn on_break<F>(self, f: F) -> Self
    where
        F: Fn(&BreakCause<E>, Duration, &mut Context) + Send + Sync + 'static,
    {
        self.hook_registry.set_on_break(f);
        self
    }

    /// Sets the hook called when the circuit closes.
    pub fn on_reset<F>(self, f: F) -> Self
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        self.hook_registry.set_on_reset(f);
        self
    }

    /// Sets the hook called when the circuit becomes half-open.
    pub fn on_half_open<F>(self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.hook_registry.set_on_half_open(f);
        self
    }

    /// Builds a new circuit breaker with the configured settings.
    pub fn build(self) -> CircuitBreaker<P, E> {
        CircuitBreaker::new(
            self.name,
            self.policy,
            self.break_duration,
            self.clock,
            self.handles,
            self.metric_sink,
            Arc::new(self.hook_registry),
        )
    }
}

/// Declarative choice of failure-detection policy.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyConfig {
    /// Break after `threshold` consecutive failures.
    ConsecutiveCount {
        /// Failures allowed before breaking.
        threshold: u32,
    },
    /// Break when failures average more than `threshold` per `relevance`.
    FrequencyAverage {
        /// Failures allowed per relevance window.
        threshold: u32,
        /// Window within which failures are considered related.
        relevance: Duration,
    },
    /// Break on `threshold` or more failures among the last `window_size` calls.
    FixedWindowProportion {
        /// Failures allowed before breaking.
        threshold: usize,
        /// Number of recent calls considered.
        window_size: usize,
    },
    /// Break when `threshold` failures fall within `relevance` of each other.
    TimestampWindow {
        /// Failures allowed before breaking.
        threshold: usize,
        /// Window within which failures are considered related.
        relevance: Duration,
    },
    /// Break when the failure ratio over a rolling time window reaches `failure_threshold`.
    RollingWindow {
        /// Failure ratio in `(0, 1]` at which to break.
        failure_threshold: f64,
        /// Length of the trailing window.
        timeslice_duration: Duration,
        /// Calls the window must see before the ratio is considered.
        minimum_throughput: u64,
    },
}

impl PolicyConfig {
    /// Validates the parameters and instantiates the policy.
    pub fn build(&self) -> Result<AnyPolicy, ConfigError> {
        let policy = match *self {
            PolicyConfig::ConsecutiveCount { threshold } => {
                AnyPolicy::ConsecutiveFailures(ConsecutiveFailures::new(threshold)?)
            }
            PolicyConfig::FrequencyAverage {
                threshold,
                relevance,
            } => AnyPolicy::FrequencyAverage(FrequencyAverage::new(threshold, relevance)?),
            PolicyConfig::FixedWindowProportion {
                threshold,
                window_size,
            } => AnyPolicy::FailureProportion(FailureProportion::new(threshold, window_size)?),
            PolicyConfig::TimestampWindow {
                threshold,
                relevance,
            } => AnyPolicy::TimestampWindow(TimestampWindow::new(threshold, relevance)?),
            PolicyConfig::RollingWindow {
                failure_threshold,
                timeslice_duration,
                minimum_throughput,
            } => AnyPolicy::RollingWindow(RollingWindowPolicy::new(
                failure_threshold,
                timeslice_duration,
                minimum_throughput,
            )?),
        };

        Ok(policy)
    }
}
