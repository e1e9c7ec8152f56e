use polly_breaker::{
    BreakerError, CircuitBreaker, CircuitState, ManualClock, RollingWindowPolicy, Timestamp,
};
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TestError {
    DivideByZero,
    ArgumentNull,
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestError::DivideByZero => write!(f, "attempted to divide by zero"),
            TestError::ArgumentNull => write!(f, "value cannot be null"),
        }
    }
}

impl Error for TestError {}

type Breaker = CircuitBreaker<RollingWindowPolicy, TestError>;

const TIMESLICE: Duration = Duration::from_secs(10);
const BREAK: Duration = Duration::from_secs(30);

fn breaker(clock: &ManualClock, failure_threshold: f64, minimum_throughput: u64) -> Breaker {
    let policy = RollingWindowPolicy::new(failure_threshold, TIMESLICE, minimum_throughput).unwrap();

    CircuitBreaker::builder(policy)
        .clock(clock.clone())
        .break_duration(BREAK)
        .handle(|err| *err == TestError::DivideByZero)
        .build()
}

fn raise(breaker: &Breaker, err: TestError) -> BreakerError<TestError> {
    breaker.call(|| -> Result<(), TestError> { Err(err) }).unwrap_err()
}

fn succeed(breaker: &Breaker) {
    breaker.call(|| -> Result<(), TestError> { Ok(()) }).unwrap();
}

fn assert_broken(err: BreakerError<TestError>) {
    match err {
        BreakerError::BrokenCircuit(cause) => assert_eq!(*cause, TestError::DivideByZero),
        other => panic!("expected a broken circuit, got {:?}", other),
    }
}

#[test]
fn test_initialises_closed() {
    let breaker = breaker(&ManualClock::new(), 0.5, 4);
    assert_eq!(breaker.current_state(), CircuitState::Closed);
}

#[test]
fn test_opens_when_every_call_in_the_timeslice_fails() {
    let clock = ManualClock::new();
    let breaker = breaker(&clock, 0.5, 4);

    for _ in 0..3 {
        raise(&breaker, TestError::DivideByZero);
        assert_eq!(breaker.current_state(), CircuitState::Closed);
    }

    raise(&breaker, TestError::DivideByZero);
    assert_eq!(breaker.current_state(), CircuitState::Open);

    assert_broken(raise(&breaker, TestError::DivideByZero));
    assert_eq!(breaker.current_state(), CircuitState::Open);
}

#[test]
fn test_opens_when_threshold_exceeded_though_not_all_calls_fail() {
    let clock = ManualClock::new();
    let breaker = breaker(&clock, 0.5, 4);

    succeed(&breaker);
    raise(&breaker, TestError::DivideByZero);
    raise(&breaker, TestError::DivideByZero);
    assert_eq!(breaker.current_state(), CircuitState::Closed);

    raise(&breaker, TestError::DivideByZero);
    assert_eq!(breaker.current_state(), CircuitState::Open);
    assert_broken(raise(&breaker, TestError::DivideByZero));
}

#[test]
fn test_opens_when_threshold_exactly_equalled() {
    let clock = ManualClock::new();
    let breaker = breaker(&clock, 0.5, 4);

    succeed(&breaker);
    succeed(&breaker);
    raise(&breaker, TestError::DivideByZero);
    assert_eq!(breaker.current_state(), CircuitState::Closed);

    raise(&breaker, TestError::DivideByZero);
    assert_eq!(breaker.current_state(), CircuitState::Open);
    assert_broken(raise(&breaker, TestError::DivideByZero));
}

#[test]
fn test_stays_closed_when_throughput_not_met_before_timeslice_expires() {
    let clock = ManualClock::new();
    let breaker = breaker(&clock, 0.5, 4);

    succeed(&breaker);
    succeed(&breaker);
    raise(&breaker, TestError::DivideByZero);

    clock.set(Timestamp::ZERO.saturating_add(TIMESLICE * 2));
    raise(&breaker, TestError::DivideByZero);
    assert_eq!(breaker.current_state(), CircuitState::Closed);
}

#[test]
fn test_stays_closed_when_timeslice_expires_exactly() {
    let clock = ManualClock::new();
    let breaker = breaker(&clock, 0.5, 4);

    succeed(&breaker);
    succeed(&breaker);
    raise(&breaker, TestError::DivideByZero);

    clock.set(Timestamp::ZERO.saturating_add(TIMESLICE));
    raise(&breaker, TestError::DivideByZero);
    assert_eq!(breaker.current_state(), CircuitState::Closed);
}

#[test]
fn test_opens_when_last_failure_lands_just_inside_timeslice() {
    let clock = ManualClock::new();
    let breaker = breaker(&clock, 0.5, 4);

    for _ in 0..3 {
        raise(&breaker, TestError::DivideByZero);
    }

    clock.set(Timestamp::ZERO.saturating_add(TIMESLICE - Duration::from_nanos(1)));
    raise(&breaker, TestError::DivideByZero);
    assert_eq!(breaker.current_state(), CircuitState::Open);
    assert_broken(raise(&breaker, TestError::DivideByZero));
}

#[test]
fn test_stays_closed_when_neither_threshold_nor_throughput_met() {
    let clock = ManualClock::new();
    let breaker = breaker(&clock, 0.5, 4);

    succeed(&breaker);
    succeed(&breaker);
    raise(&breaker, TestError::DivideByZero);
    assert_eq!(breaker.current_state(), CircuitState::Closed);
}

#[test]
fn test_stays_closed_when_throughput_met_but_threshold_not() {
    let clock = ManualClock::new();
    let breaker = breaker(&clock, 0.5, 4);

    succeed(&breaker);
    succeed(&breaker);
    succeed(&breaker);
    raise(&breaker, TestError::DivideByZero);
    assert_eq!(breaker.current_state(), CircuitState::Closed);
}

#[test]
fn test_unhandled_faults_do_not_count() {
    let clock = ManualClock::new();
    let breaker = breaker(&clock, 0.5, 4);

    for _ in 0..4 {
        match raise(&breaker, TestError::ArgumentNull) {
            BreakerError::Operation(fault) => assert_eq!(*fault, TestError::ArgumentNull),
            other => panic!("expected the operation's fault, got {:?}", other),
        }
        assert_eq!(breaker.current_state(), CircuitState::Closed);
    }
}

#[test]
fn test_failure_threshold_of_one_requires_every_call_to_fail() {
    let clock = ManualClock::new();
    let breaker = breaker(&clock, 1.0, 2);

    succeed(&breaker);
    raise(&breaker, TestError::DivideByZero);
    raise(&breaker, TestError::DivideByZero);
    assert_eq!(breaker.current_state(), CircuitState::Closed);

    breaker.reset();
    raise(&breaker, TestError::DivideByZero);
    raise(&breaker, TestError::DivideByZero);
    assert_eq!(breaker.current_state(), CircuitState::Open);
}

#[test]
fn test_old_failures_age_out_bucket_by_bucket() {
    let clock = ManualClock::new();
    let breaker = breaker(&clock, 0.5, 4);

    raise(&breaker, TestError::DivideByZero);
    raise(&breaker, TestError::DivideByZero);

    clock.advance(Duration::from_secs(5));
    succeed(&breaker);
    succeed(&breaker);
    succeed(&breaker);

    // The first two failures fall out of the window; one failure in four is not enough
    clock.advance(Duration::from_secs(5));
    raise(&breaker, TestError::DivideByZero);
    assert_eq!(breaker.current_state(), CircuitState::Closed);
}

#[test]
fn test_half_opens_after_break_and_reopens_on_failure() {
    let clock = ManualClock::new();
    let breaker = breaker(&clock, 0.5, 4);

    for _ in 0..4 {
        raise(&breaker, TestError::DivideByZero);
    }
    assert_eq!(breaker.current_state(), CircuitState::Open);

    clock.advance(BREAK);
    assert_eq!(breaker.current_state(), CircuitState::HalfOpen);

    assert!(matches!(
        raise(&breaker, TestError::DivideByZero),
        BreakerError::Operation(_)
    ));
    assert_eq!(breaker.current_state(), CircuitState::Open);
    assert_broken(raise(&breaker, TestError::DivideByZero));
}

#[test]
fn test_closes_after_break_when_trial_call_succeeds() {
    let resets = Arc::new(AtomicUsize::new(0));
    let clock = ManualClock::new();
    let policy = RollingWindowPolicy::new(0.5, TIMESLICE, 4).unwrap();
    let breaker: Breaker = CircuitBreaker::builder(policy)
        .clock(clock.clone())
        .break_duration(BREAK)
        .on_reset({
            let resets = Arc::clone(&resets);
            move |_| {
                resets.fetch_add(1, Ordering::SeqCst);
            }
        })
        .build();

    for _ in 0..4 {
        raise(&breaker, TestError::DivideByZero);
    }
    clock.advance(BREAK);
    assert_eq!(breaker.current_state(), CircuitState::HalfOpen);
    assert_eq!(resets.load(Ordering::SeqCst), 0);

    succeed(&breaker);
    assert_eq!(breaker.current_state(), CircuitState::Closed);
    assert_eq!(resets.load(Ordering::SeqCst), 1);

    // Health from before the break was discarded
    raise(&breaker, TestError::DivideByZero);
    assert_eq!(breaker.current_state(), CircuitState::Closed);
}

#[test]
fn test_trial_success_counts_in_fresh_window() {
    let clock = ManualClock::new();
    let breaker = breaker(&clock, 0.5, 4);

    for _ in 0..4 {
        raise(&breaker, TestError::DivideByZero);
    }
    clock.advance(BREAK);
    succeed(&breaker);
    assert_eq!(breaker.current_state(), CircuitState::Closed);

    raise(&breaker, TestError::DivideByZero);
    raise(&breaker, TestError::DivideByZero);
    assert_eq!(breaker.current_state(), CircuitState::Closed);

    // One success and three failures meet both thresholds
    raise(&breaker, TestError::DivideByZero);
    assert_eq!(breaker.current_state(), CircuitState::Open);
}

#[test]
fn test_handles_break_duration_of_max() {
    let clock = ManualClock::new();
    let policy = RollingWindowPolicy::new(0.5, TIMESLICE, 4).unwrap();
    let breaker: Breaker = CircuitBreaker::builder(policy)
        .clock(clock.clone())
        .break_duration(Duration::MAX)
        .build();

    assert!(matches!(
        raise(&breaker, TestError::DivideByZero),
        BreakerError::Operation(_)
    ));
}

#[test]
fn test_rejects_invalid_parameters() {
    let cases = [
        (0.0, TIMESLICE, 4, "failure_threshold"),
        (-0.5, TIMESLICE, 4, "failure_threshold"),
        (1.01, TIMESLICE, 4, "failure_threshold"),
        (f64::NAN, TIMESLICE, 4, "failure_threshold"),
        (0.5, Duration::ZERO, 4, "timeslice_duration"),
        (0.5, TIMESLICE, 0, "minimum_throughput"),
    ];

    for (threshold, timeslice, throughput, parameter) in cases {
        let err = RollingWindowPolicy::new(threshold, timeslice, throughput).unwrap_err();
        assert_eq!(err.parameter(), parameter);
    }

    assert!(RollingWindowPolicy::new(1.0, TIMESLICE, 1).is_ok());
}
