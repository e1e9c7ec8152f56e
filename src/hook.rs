//! Hook registry for circuit breaker transitions.
//!
//! Hooks run synchronously while the breaker's lock is held. They must be
//! quick and must not call back into the breaker that invoked them; doing so
//! from the same thread panics rather than deadlocking.

use crate::context::Context;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Why a circuit broke.
#[derive(Debug)]
pub enum BreakCause<E> {
    /// Observed failures met the policy's threshold, or a half-open trial failed.
    Fault(Arc<E>),

    /// The circuit was isolated manually.
    Isolated,
}

impl<E> Clone for BreakCause<E> {
    fn clone(&self) -> Self {
        match self {
            BreakCause::Fault(fault) => BreakCause::Fault(Arc::clone(fault)),
            BreakCause::Isolated => BreakCause::Isolated,
        }
    }
}

impl<E: fmt::Display> fmt::Display for BreakCause<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakCause::Fault(fault) => write!(f, "{}", fault),
            BreakCause::Isolated => write!(f, "manually isolated"),
        }
    }
}

type BreakHookFn<E> = Arc<dyn Fn(&BreakCause<E>, Duration, &mut Context) + Send + Sync + 'static>;
type ResetHookFn = Arc<dyn Fn(&mut Context) + Send + Sync + 'static>;
type HookFn = Arc<dyn Fn() + Send + Sync + 'static>;

/// A registry for circuit breaker transition hooks.
pub struct HookRegistry<E> {
    on_break: RwLock<Option<BreakHookFn<E>>>,
    on_reset: RwLock<Option<ResetHookFn>>,
    on_half_open: RwLock<Option<HookFn>>,
}

impl<E> Default for HookRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for HookRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("on_break", &self.on_break.read().is_some())
            .field("on_reset", &self.on_reset.read().is_some())
            .field("on_half_open", &self.on_half_open.read().is_some())
            .finish()
    }
}

impl<E> HookRegistry<E> {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self {
            on_break: RwLock::new(None),
            on_reset: RwLock::new(None),
            on_half_open: RwLock::new(None),
        }
    }

    /// Sets the hook to call when the circuit breaks.
    ///
    /// Receives the cause, how long the circuit will stay open, and the
    /// context of the execution that broke it.
    pub fn set_on_break<F>(&self, f: F)
    where
        F: Fn(&BreakCause<E>, Duration, &mut Context) + Send + Sync + 'static,
    {
        *self.on_break.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when the circuit closes.
    pub fn set_on_reset<F>(&self, f: F)
    where
        F: Fn(&mut Context) + Send + Sync + 'static,
    {
        *self.on_reset.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when the circuit becomes half-open.
    pub fn set_on_half_open<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.on_half_open.write() = Some(Arc::new(f));
    }

    pub(crate) fn execute_break_hook(
        &self,
        cause: &BreakCause<E>,
        duration: Duration,
        context: &mut Context,
    ) {
        if let Some(hook) = self.on_break.read().as_ref() {
            hook(cause, duration, context);
        }
    }

    pub(crate) fn execute_reset_hook(&self, context: &mut Context) {
        if let Some(hook) = self.on_reset.read().as_ref() {
            hook(context);
        }
    }

    pub(crate) fn execute_half_open_hook(&self) {
        if let Some(hook) = self.on_half_open.read().as_ref() {
            hook();
        }
    }
}
