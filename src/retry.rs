//! Wait-and-retry policy for async operations.
//!
//! Retries a faulting operation after a sequence of waits, stopping as soon
//! as cancellation is requested. A retry policy never consults a circuit
//! breaker; compose the two by calling a breaker from inside the retried
//! operation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::context::Context;
use crate::error::RetryError;

type RetryHookFn<E> = Arc<dyn Fn(&E, Duration, &mut Context) + Send + Sync + 'static>;
type DurationProvider = Arc<dyn Fn(u32) -> Duration + Send + Sync + 'static>;

#[derive(Clone)]
enum Schedule {
    Fixed(Vec<Duration>),
    Provided {
        retry_count: u32,
        provider: DurationProvider,
    },
}

/// Retries handled faults, waiting between attempts.
pub struct WaitAndRetry<E> {
    schedule: Schedule,
    handles: Arc<dyn Fn(&E) -> bool + Send + Sync + 'static>,
    on_retry: Option<RetryHookFn<E>>,
}

impl<E> fmt::Debug for WaitAndRetry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("WaitAndRetry");
        match &self.schedule {
            Schedule::Fixed(durations) => debug.field("sleep_durations", durations),
            Schedule::Provided { retry_count, .. } => debug.field("retry_count", retry_count),
        };
        debug.field("on_retry", &self.on_retry.is_some()).finish()
    }
}

impl<E> WaitAndRetry<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Retries once per entry of `sleep_durations`, waiting that long before each retry.
    pub fn new<I>(sleep_durations: I) -> Self
    where
        I: IntoIterator<Item = Duration>,
    {
        Self::from_schedule(Schedule::Fixed(sleep_durations.into_iter().collect()))
    }

    /// Retries up to `retry_count` times, waiting `provider(n)` before retry `n` (1-based).
    pub fn with_provider<F>(retry_count: u32, provider: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self::from_schedule(Schedule::Provided {
            retry_count,
            provider: Arc::new(provider),
        })
    }

    fn from_schedule(schedule: Schedule) -> Self {
        Self {
            schedule,
            handles: Arc::new(|_: &E| true),
            on_retry: None,
        }
    }

    /// Restricts which faults are retried. Others are returned immediately.
    pub fn handle<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.handles = Arc::new(predicate);
        self
    }

    /// Sets a hook called with the fault and the upcoming wait before each retry.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(&E, Duration, &mut Context) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(f));
        self
    }

    fn wait_before(&self, retry: u32) -> Option<Duration> {
        match &self.schedule {
            Schedule::Fixed(durations) => {
                let index = usize::try_from(retry).ok()?.checked_sub(1)?;
                durations.get(index).copied()
            }
            Schedule::Provided {
                retry_count,
                provider,
            } => (retry <= *retry_count).then(|| provider(retry)),
        }
    }

    /// Runs `operation` with a fresh empty context.
    pub async fn execute<F, Fut, T>(
        &self,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.execute_with_context(&mut Context::new(), cancel, operation)
            .await
    }

    /// Runs `operation`, retrying handled faults until the schedule is exhausted.
    ///
    /// Cancellation is checked before every attempt, after every failed
    /// attempt, after the retry hook and throughout each wait; once seen, no
    /// further attempt is made.
    pub async fn execute_with_context<F, Fut, T>(
        &self,
        context: &mut Context,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut retry = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }

            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled);
            }
            if !(self.handles)(&err) {
                return Err(RetryError::Operation(err));
            }

            retry = retry.saturating_add(1);
            let Some(wait) = self.wait_before(retry) else {
                return Err(RetryError::Operation(err));
            };

            tracing::debug!(retry, ?wait, error = %err, "retrying after handled fault");
            if let Some(hook) = &self.on_retry {
                hook(&err, wait, context);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}
