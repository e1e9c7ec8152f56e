//! Health accounting and metrics for the circuit breaker.

use smallvec::{smallvec, SmallVec};
use std::time::Duration;

use crate::clock::Timestamp;
use crate::state::CircuitState;

/// Trait for metrics sinks that can receive circuit breaker events.
pub trait MetricSink: Send + Sync + 'static {
    /// Records a state transition event.
    fn record_state_transition(&self, from: CircuitState, to: CircuitState);

    /// Records a call that was rejected without being attempted.
    fn record_rejection(&self, state: CircuitState);

    /// Records whether a half-open probe was admitted.
    fn record_probe_attempt(&self, admitted: bool);

    /// Records a call result.
    fn record_call(&self, success: bool, duration: Duration);
}

/// A null metrics sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMetricSink;

impl MetricSink for NullMetricSink {
    fn record_state_transition(&self, _from: CircuitState, _to: CircuitState) {}
    fn record_rejection(&self, _state: CircuitState) {}
    fn record_probe_attempt(&self, _admitted: bool) {}
    fn record_call(&self, _success: bool, _duration: Duration) {}
}

/// Success and failure totals over some window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthCounts {
    /// Successful calls.
    pub successes: u64,
    /// Failed calls.
    pub failures: u64,
}

impl HealthCounts {
    /// Total calls observed.
    pub fn throughput(&self) -> u64 {
        self.successes + self.failures
    }

    /// Fraction of calls that failed, or zero when nothing was observed.
    pub fn failure_ratio(&self) -> f64 {
        let throughput = self.throughput();
        if throughput == 0 {
            return 0.0;
        }

        self.failures as f64 / throughput as f64
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    started_at: Timestamp,
    counts: HealthCounts,
}

/// A trailing time window split into equal-width buckets.
///
/// Calls land in the newest bucket until it is one bucket-width old, at which
/// point a new bucket is opened. A bucket stops counting once it is a full
/// window old.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    buckets: SmallVec<[Bucket; 16]>,
    window: Duration,
    bucket_width: Duration,
}

impl RollingWindow {
    /// Number of buckets the window is divided into.
    pub const BUCKET_COUNT: u32 = 10;

    /// Creates an empty window spanning `window`.
    pub fn new(window: Duration) -> Self {
        Self {
            buckets: SmallVec::new(),
            window,
            bucket_width: (window / Self::BUCKET_COUNT).max(Duration::from_nanos(1)),
        }
    }

    /// Length of the whole window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Buckets currently held, live or not yet evicted.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Records a successful call at `now`.
    pub fn record_success(&mut self, now: Timestamp) {
        self.current_bucket(now).counts.successes += 1;
    }

    /// Records a failed call at `now`.
    pub fn record_failure(&mut self, now: Timestamp) {
        self.current_bucket(now).counts.failures += 1;
    }

    /// Totals over every bucket still inside the window at `now`.
    pub fn counts(&mut self, now: Timestamp) -> HealthCounts {
        self.evict_stale(now);

        self.buckets
            .iter()
            .fold(HealthCounts::default(), |mut total, bucket| {
                total.successes += bucket.counts.successes;
                total.failures += bucket.counts.failures;
                total
            })
    }

    /// Discards every bucket.
    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    fn current_bucket(&mut self, now: Timestamp) -> &mut Bucket {
        self.evict_stale(now);

        let needs_new = match self.buckets.last() {
            Some(bucket) => now.saturating_duration_since(bucket.started_at) >= self.bucket_width,
            None => true,
        };

        if needs_new {
            self.buckets.push(Bucket {
                started_at: now,
                counts: HealthCounts::default(),
            });
        }

        let last = self.buckets.len() - 1;
        &mut self.buckets[last]
    }

    fn evict_stale(&mut self, now: Timestamp) {
        let stale = self
            .buckets
            .iter()
            .take_while(|bucket| now.saturating_duration_since(bucket.started_at) >= self.window)
            .count();

        if stale > 0 {
            self.buckets.drain(..stale);
        }
    }
}

/// The outcomes of the most recent `capacity` calls.
#[derive(Debug, Clone)]
pub struct OutcomeRing {
    slots: SmallVec<[bool; 32]>,
    next: usize,
    filled: usize,
    failures: usize,
}

impl OutcomeRing {
    /// Creates an empty ring remembering `capacity` outcomes.
    ///
    /// A zero-capacity ring ignores everything pushed into it.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: smallvec![false; capacity],
            next: 0,
            filled: 0,
            failures: 0,
        }
    }

    /// Records one outcome, overwriting the oldest once full.
    pub fn push(&mut self, failed: bool) {
        if self.slots.is_empty() {
            return;
        }

        if self.filled == self.slots.len() {
            if self.slots[self.next] {
                self.failures -= 1;
            }
        } else {
            self.filled += 1;
        }

        self.slots[self.next] = failed;
        if failed {
            self.failures += 1;
        }
        self.next = (self.next + 1) % self.slots.len();
    }

    /// Failures among the retained outcomes.
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Outcomes currently retained.
    pub fn len(&self) -> usize {
        self.filled
    }

    /// Returns true if nothing has been recorded since creation or the last clear.
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Number of outcomes the ring remembers once full.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns true once every slot holds an outcome.
    pub fn is_full(&self) -> bool {
        self.filled == self.slots.len()
    }

    /// Forgets every outcome.
    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = false);
        self.next = 0;
        self.filled = 0;
        self.failures = 0;
    }
}
