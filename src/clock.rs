//! Time sources for the circuit breaker.
//!
//! Every time-sensitive decision made by a breaker or a failure-detection
//! policy reads the time through a [`Clock`]. Production code uses
//! [`SystemClock`]; tests inject a [`ManualClock`] and move it forward
//! explicitly instead of sleeping.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A point in time, measured as the distance from the owning clock's epoch.
///
/// Timestamps from different clocks are not comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(Duration);

impl Timestamp {
    /// The clock's epoch. Used as the "never blocked" value.
    pub const ZERO: Timestamp = Timestamp(Duration::ZERO);

    /// The latest representable timestamp.
    pub const MAX: Timestamp = Timestamp(Duration::MAX);

    /// Creates a timestamp at the given offset from the epoch.
    pub const fn from_epoch(offset: Duration) -> Self {
        Timestamp(offset)
    }

    /// Offset of this timestamp from the epoch.
    pub const fn since_epoch(self) -> Duration {
        self.0
    }

    /// Adds `duration`, clamping to [`Timestamp::MAX`] on overflow.
    pub fn saturating_add(self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(duration))
    }

    /// Subtracts `duration`, clamping to [`Timestamp::ZERO`].
    pub fn saturating_sub(self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_sub(duration))
    }

    /// Time elapsed from `earlier` to `self`, or zero if `earlier` is later.
    pub fn saturating_duration_since(self, earlier: Timestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// A source of the current time.
pub trait Clock: Send + Sync + fmt::Debug + 'static {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

static PROCESS_EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Monotonic wall time, measured from the first time any `SystemClock` is read.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp(PROCESS_EPOCH.elapsed())
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying time, so a test can keep one handle and
/// give another to the breaker.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Timestamp>>,
}

impl ManualClock {
    /// Creates a manual clock positioned at its epoch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manual clock positioned at `start`.
    pub fn starting_at(start: Timestamp) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Moves the clock to `at`. Moving backwards is allowed.
    pub fn set(&self, at: Timestamp) {
        *self.now.lock() = at;
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = now.saturating_add(by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock()
    }
}
