//! Core circuit breaker implementation.
//!
//! All of a breaker's mutable state (the stored phase, the policy's
//! counters, the last fault and the half-open permit) lives behind one
//! mutex. Every public operation takes that lock once, reads the clock once,
//! and applies its whole transition, hook invocation included, before
//! releasing it.

use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::{Clock, Timestamp};
use crate::context::Context;
use crate::error::{BreakerError, BreakerResult};
use crate::hook::{BreakCause, HookRegistry};
use crate::metrics::MetricSink;
use crate::policy::BreakerPolicy;
use crate::state::{CircuitState, Observation, StateManager};

pub(crate) type FaultPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync + 'static>;

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

fn current_thread_token() -> u64 {
    THREAD_TOKEN.with(|token| *token)
}

/// Clears the running-hook marker even if the hook panics.
struct HookScope<'a>(&'a AtomicU64);

impl Drop for HookScope<'_> {
    fn drop(&mut self) {
        self.0.store(0, Ordering::Release);
    }
}

/// State guarded by the breaker's lock.
struct Controller<P, E> {
    state: StateManager,
    policy: P,
    last_fault: Option<Arc<E>>,
}

/// Inner state of the circuit breaker, shared between clones.
struct BreakerInner<P, E> {
    name: String,
    controller: Mutex<Controller<P, E>>,
    break_duration: Duration,
    clock: Arc<dyn Clock>,
    handles: FaultPredicate<E>,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry<E>>,
    hook_thread: AtomicU64,
}

/// A circuit breaker that can wrap function calls to prevent cascading failures.
///
/// The breaker can be driven two ways: through [`call`](Self::call) and its
/// siblings, which run the operation and report its outcome, or directly
/// through [`admit`](Self::admit), [`on_success`](Self::on_success) and
/// [`on_failure`](Self::on_failure) when the caller owns the execution.
pub struct CircuitBreaker<P, E>
where
    P: BreakerPolicy,
    E: std::error::Error + Send + Sync + 'static,
{
    inner: Arc<BreakerInner<P, E>>,
}

impl<P, E> CircuitBreaker<P, E>
where
    P: BreakerPolicy,
    E: std::error::Error + Send + Sync + 'static,
{
    pub(crate) fn new(
        name: String,
        policy: P,
        break_duration: Duration,
        clock: Arc<dyn Clock>,
        handles: FaultPredicate<E>,
        metric_sink: Arc<dyn MetricSink>,
        hooks: Arc<HookRegistry<E>>,
    ) -> Self {
        let inner = BreakerInner {
            name,
            controller: Mutex::new(Controller {
                state: StateManager::new(),
                policy,
                last_fault: None,
            }),
            break_duration,
            clock,
            handles,
            metric_sink,
            hooks,
            hook_thread: AtomicU64::new(0),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Creates a new builder for a circuit breaker guarded by `policy`.
    pub fn builder(policy: P) -> crate::config::BreakerBuilder<P, E> {
        crate::config::BreakerBuilder::new(policy)
    }

    /// The name this breaker reports in logs.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// How long the circuit stays open after breaking.
    pub fn break_duration(&self) -> Duration {
        self.inner.break_duration
    }

    /// Gets the current state of the circuit breaker.
    ///
    /// Reading the state of an open circuit whose break has elapsed moves it
    /// to half-open and fires the half-open hook.
    pub fn current_state(&self) -> CircuitState {
        let mut controller = self.lock();
        let now = self.inner.clock.now();
        self.observe(&mut controller, now).state
    }

    /// The most recent handled fault, or `None` if no fault has been recorded yet.
    pub fn last_fault(&self) -> Option<Arc<E>> {
        self.lock().last_fault.clone()
    }

    /// The instant calls are blocked until, while the circuit is open or half-open.
    pub fn blocked_until(&self) -> Option<Timestamp> {
        self.lock().state.blocked_until()
    }

    /// Decides whether a call may proceed.
    ///
    /// Returns [`BreakerError::Isolated`] while isolated and
    /// [`BreakerError::BrokenCircuit`] while open. Once the break has elapsed a
    /// single trial call is admitted; others are rejected until its outcome is
    /// reported.
    pub fn admit(&self) -> Result<(), BreakerError<E>> {
        let mut controller = self.lock();
        let now = self.inner.clock.now();

        match self.observe(&mut controller, now).state {
            CircuitState::Closed => Ok(()),
            CircuitState::Isolated => {
                self.inner
                    .metric_sink
                    .record_rejection(CircuitState::Isolated);
                tracing::debug!(breaker = %self.inner.name, "call rejected by isolated circuit");

                Err(BreakerError::Isolated)
            }
            CircuitState::Open => Err(self.reject_broken(&controller, CircuitState::Open)),
            CircuitState::HalfOpen => {
                let admitted = controller
                    .state
                    .try_take_probe(now, self.inner.break_duration);
                self.inner.metric_sink.record_probe_attempt(admitted);

                if admitted {
                    tracing::debug!(breaker = %self.inner.name, "admitting half-open trial call");
                    Ok(())
                } else {
                    Err(self.reject_broken(&controller, CircuitState::HalfOpen))
                }
            }
        }
    }

    /// Reports a call that completed without a handled fault.
    ///
    /// A success while half-open closes the circuit and is then counted as
    /// the first outcome of the fresh window.
    pub fn on_success(&self, context: &mut Context) {
        let mut controller = self.lock();
        let now = self.inner.clock.now();

        match self.observe(&mut controller, now).state {
            CircuitState::HalfOpen => {
                self.close(&mut controller, CircuitState::HalfOpen, context);
                controller.policy.record_success(now);
            }
            CircuitState::Closed => controller.policy.record_success(now),
            CircuitState::Open | CircuitState::Isolated => {}
        }
    }

    /// Reports a call that failed with a handled fault.
    ///
    /// A failure while half-open re-opens the circuit straight away. While
    /// closed the fault is counted and the policy decides whether to break.
    /// Faults arriving while already open only update the last fault.
    pub fn on_failure(&self, fault: Arc<E>, context: &mut Context) {
        let mut controller = self.lock();
        let now = self.inner.clock.now();
        controller.last_fault = Some(Arc::clone(&fault));

        match self.observe(&mut controller, now).state {
            CircuitState::HalfOpen => {
                self.trip(
                    &mut controller,
                    now,
                    CircuitState::HalfOpen,
                    BreakCause::Fault(fault),
                    context,
                );
            }
            CircuitState::Closed => {
                controller.policy.record_failure(now);
                if controller.policy.should_break(now) {
                    self.trip(
                        &mut controller,
                        now,
                        CircuitState::Closed,
                        BreakCause::Fault(fault),
                        context,
                    );
                }
            }
            CircuitState::Open | CircuitState::Isolated => {}
        }
    }

    /// Holds the circuit open until [`reset`](Self::reset) is called.
    pub fn isolate(&self) {
        self.isolate_with_context(&mut Context::new());
    }

    /// Like [`isolate`](Self::isolate), passing `context` to the break hook.
    ///
    /// The break hook fires even if the circuit was already open or isolated.
    pub fn isolate_with_context(&self, context: &mut Context) {
        let mut controller = self.lock();
        let now = self.inner.clock.now();
        let from = controller.state.peek(now);

        controller.state.isolate();
        controller.policy.reset();

        tracing::warn!(breaker = %self.inner.name, from = %from, "circuit manually isolated");
        self.inner
            .metric_sink
            .record_state_transition(from, CircuitState::Isolated);
        self.run_hook(|| {
            self.inner
                .hooks
                .execute_break_hook(&BreakCause::Isolated, Duration::MAX, context)
        });
    }

    /// Closes the circuit from any state and clears the policy's counters.
    pub fn reset(&self) {
        self.reset_with_context(&mut Context::new());
    }

    /// Like [`reset`](Self::reset), passing `context` to the reset hook.
    pub fn reset_with_context(&self, context: &mut Context) {
        let mut controller = self.lock();
        let now = self.inner.clock.now();
        let from = controller.state.peek(now);

        self.close(&mut controller, from, context);
    }

    /// Executes a function wrapped by the circuit breaker, with a fresh empty context.
    pub fn call<F, T>(&self, f: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.call_with_context(&mut Context::new(), f)
    }

    /// Executes a function wrapped by the circuit breaker.
    ///
    /// `context` is handed to any hook fired while reporting the outcome.
    pub fn call_with_context<F, T>(&self, context: &mut Context, f: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        self.admit()?;

        let start = Instant::now();
        let result = f();
        let duration = start.elapsed();

        self.post_call(result, duration, context)
    }

    /// Records the outcome of an admitted call and converts its error.
    ///
    /// Faults rejected by the handle predicate are passed through without
    /// being reported to the controller.
    fn post_call<T>(
        &self,
        result: Result<T, E>,
        duration: Duration,
        context: &mut Context,
    ) -> BreakerResult<T, E> {
        match result {
            Ok(value) => {
                self.inner.metric_sink.record_call(true, duration);
                self.on_success(context);
                Ok(value)
            }
            Err(err) => {
                self.inner.metric_sink.record_call(false, duration);
                let fault = Arc::new(err);
                if (self.inner.handles)(&*fault) {
                    self.on_failure(Arc::clone(&fault), context);
                }
                Err(BreakerError::Operation(fault))
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Controller<P, E>> {
        if self.inner.hook_thread.load(Ordering::Acquire) == current_thread_token() {
            panic!(
                "circuit breaker `{}` re-entered from one of its own hooks; hooks run under the breaker's lock and must not call back into it",
                self.inner.name
            );
        }

        self.inner.controller.lock()
    }

    fn run_hook(&self, hook: impl FnOnce()) {
        self.inner
            .hook_thread
            .store(current_thread_token(), Ordering::Release);
        let _scope = HookScope(&self.inner.hook_thread);
        hook();
    }

    fn observe(&self, controller: &mut Controller<P, E>, now: Timestamp) -> Observation {
        let observation = controller.state.observe(now);

        if observation.entered_half_open {
            tracing::debug!(breaker = %self.inner.name, "break elapsed, circuit half-open");
            self.inner
                .metric_sink
                .record_state_transition(CircuitState::Open, CircuitState::HalfOpen);
            self.run_hook(|| self.inner.hooks.execute_half_open_hook());
        }

        observation
    }

    fn reject_broken(&self, controller: &Controller<P, E>, state: CircuitState) -> BreakerError<E> {
        self.inner.metric_sink.record_rejection(state);
        tracing::debug!(breaker = %self.inner.name, state = %state, "call rejected by open circuit");

        // The circuit only opens after a fault has been recorded.
        controller
            .last_fault
            .clone()
            .map_or(BreakerError::Isolated, BreakerError::BrokenCircuit)
    }

    fn trip(
        &self,
        controller: &mut Controller<P, E>,
        now: Timestamp,
        from: CircuitState,
        cause: BreakCause<E>,
        context: &mut Context,
    ) {
        let break_duration = self.inner.break_duration;
        controller
            .state
            .trip_open(now.saturating_add(break_duration));
        controller.policy.reset();

        tracing::warn!(
            breaker = %self.inner.name,
            from = %from,
            ?break_duration,
            cause = %cause,
            "circuit broken"
        );
        self.inner
            .metric_sink
            .record_state_transition(from, CircuitState::Open);
        self.run_hook(|| {
            self.inner
                .hooks
                .execute_break_hook(&cause, break_duration, context)
        });
    }

    fn close(&self, controller: &mut Controller<P, E>, from: CircuitState, context: &mut Context) {
        controller.state.reset_closed();
        controller.policy.reset();

        tracing::info!(breaker = %self.inner.name, from = %from, "circuit reset");
        self.inner
            .metric_sink
            .record_state_transition(from, CircuitState::Closed);
        self.run_hook(|| self.inner.hooks.execute_reset_hook(context));
    }
}

// Allow cloning of circuit breakers - cheap because inner state is Arc'd
impl<P, E> Clone for CircuitBreaker<P, E>
where
    P: BreakerPolicy,
    E: std::error::Error + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, E> fmt::Debug for CircuitBreaker<P, E>
where
    P: BreakerPolicy,
    E: std::error::Error + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.inner.name)
            .field("break_duration", &self.inner.break_duration)
            .field("clock", &self.inner.clock)
            .finish_non_exhaustive()
    }
}

// Implement Async support when the feature is enabled
#[cfg(feature = "async")]
impl<P, E> CircuitBreaker<P, E>
where
    P: BreakerPolicy,
    E: std::error::Error + Send + Sync + 'static,
{
    /// Executes an async function wrapped by the circuit breaker, with a fresh empty context.
    pub async fn call_async<F, Fut, T>(&self, f: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.call_async_with_context(&mut Context::new(), f).await
    }

    /// Executes an async function wrapped by the circuit breaker.
    ///
    /// The breaker's lock is never held while the future runs.
    pub async fn call_async_with_context<F, Fut, T>(
        &self,
        context: &mut Context,
        f: F,
    ) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.admit()?;

        let start = Instant::now();
        let result = f().await;
        let duration = start.elapsed();

        self.post_call(result, duration, context)
    }
}
