//! Circuit breaker state machine implementation.

use std::fmt;
use std::time::Duration;

use crate::clock::Timestamp;

/// Represents the possible states of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Circuit is closed and operations are allowed.
    Closed,

    /// Circuit is open and operations are rejected.
    Open,

    /// The break has elapsed and a single trial operation decides whether to close or re-open.
    HalfOpen,

    /// Circuit was opened manually and stays open until reset.
    Isolated,
}

impl CircuitState {
    /// Lower-case label suitable for metrics and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
            CircuitState::Isolated => "isolated",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Closed,
    Open {
        blocked_until: Timestamp,
        half_open: Option<Probe>,
    },
    Isolated,
}

/// Half-open bookkeeping: when the single trial call was let through, if it has been.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Probe {
    granted_at: Option<Timestamp>,
}

/// Result of reading the state at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Observation {
    pub(crate) state: CircuitState,
    /// True only for the read that first noticed the break had elapsed.
    pub(crate) entered_half_open: bool,
}

/// Stored state of one breaker. Half-open is derived from an elapsed open
/// period the first time it is observed.
#[derive(Debug)]
pub(crate) struct StateManager {
    phase: Phase,
}

impl StateManager {
    /// Creates a new state manager with the default closed state.
    pub(crate) fn new() -> Self {
        Self {
            phase: Phase::Closed,
        }
    }

    /// Reads the state at `now`, moving an elapsed open circuit to half-open.
    pub(crate) fn observe(&mut self, now: Timestamp) -> Observation {
        match &mut self.phase {
            Phase::Closed => Observation {
                state: CircuitState::Closed,
                entered_half_open: false,
            },
            Phase::Isolated => Observation {
                state: CircuitState::Isolated,
                entered_half_open: false,
            },
            Phase::Open {
                half_open: Some(_), ..
            } => Observation {
                state: CircuitState::HalfOpen,
                entered_half_open: false,
            },
            Phase::Open {
                blocked_until,
                half_open,
            } => {
                if now < *blocked_until {
                    return Observation {
                        state: CircuitState::Open,
                        entered_half_open: false,
                    };
                }

                *half_open = Some(Probe { granted_at: None });
                Observation {
                    state: CircuitState::HalfOpen,
                    entered_half_open: true,
                }
            }
        }
    }

    /// Reads the state at `now` without moving an elapsed open circuit to half-open.
    pub(crate) fn peek(&self, now: Timestamp) -> CircuitState {
        match self.phase {
            Phase::Closed => CircuitState::Closed,
            Phase::Isolated => CircuitState::Isolated,
            Phase::Open {
                half_open: Some(_), ..
            } => CircuitState::HalfOpen,
            Phase::Open { blocked_until, .. } if now >= blocked_until => CircuitState::HalfOpen,
            Phase::Open { .. } => CircuitState::Open,
        }
    }

    /// Hands out the half-open trial permit if it is free.
    ///
    /// A permit whose outcome was never reported lapses after `break_duration`.
    pub(crate) fn try_take_probe(&mut self, now: Timestamp, break_duration: Duration) -> bool {
        let Phase::Open {
            half_open: Some(probe),
            ..
        } = &mut self.phase
        else {
            return false;
        };

        let available = match probe.granted_at {
            None => true,
            Some(granted_at) => now.saturating_duration_since(granted_at) >= break_duration,
        };

        if available {
            probe.granted_at = Some(now);
        }

        available
    }

    /// Opens the circuit until `blocked_until`.
    pub(crate) fn trip_open(&mut self, blocked_until: Timestamp) {
        self.phase = Phase::Open {
            blocked_until,
            half_open: None,
        };
    }

    /// Closes the circuit.
    pub(crate) fn reset_closed(&mut self) {
        self.phase = Phase::Closed;
    }

    /// Holds the circuit open until explicitly reset.
    pub(crate) fn isolate(&mut self) {
        self.phase = Phase::Isolated;
    }

    /// The instant calls are blocked until, if the circuit is open.
    pub(crate) fn blocked_until(&self) -> Option<Timestamp> {
        match self.phase {
            Phase::Open { blocked_until, .. } => Some(blocked_until),
            Phase::Closed | Phase::Isolated => None,
        }
    }
}
