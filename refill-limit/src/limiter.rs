use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::sync::DropGuard;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::LimitError;
use crate::LimiterConfig;
use crate::Reason;
use crate::refill;
use crate::state::State;

/// Retry delay while a live refill task catches up with an overdue deadline.
const OVERDUE_BACKOFF: Duration = Duration::from_millis(1);

/// Result of [`RateLimiter::wait`].
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A permit was consumed.
    Acquired,
    /// The caller's token fired first. No permit was consumed.
    Cancelled,
}

impl WaitOutcome {
    pub fn is_acquired(self) -> bool {
        matches!(self, Self::Acquired)
    }
}

/// State shared between the limiter handle and its refill task.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) state: Mutex<State>,
    /// Fired whenever permits may have become available.
    pub(crate) available: Notify,
    /// Fired when the refill deadline moves earlier than the timer is armed for.
    pub(crate) reschedule: Notify,
}

/// A token bucket refilled by a background task.
///
/// The pool starts full. Each successful acquisition takes one permit and restarts the refill
/// timer, so permits come back one per `refill_interval` measured from the most recent
/// acquisition. An optional minimum spacing refuses acquisitions that follow the previous one
/// too closely, even when permits remain.
///
/// The refill task is a child of the cancellation token supplied at construction. Cancelling
/// that token, calling [`shutdown`](Self::shutdown) or dropping the limiter stops it for good;
/// permits left in the pool can still be taken but are never replenished.
///
/// Share it between tasks with an `Arc`.
#[derive(Debug)]
pub struct RateLimiter {
    shared: Arc<Shared>,
    cancel: CancellationToken,
    refill_task: Mutex<Option<JoinHandle<()>>>,
    _guard: DropGuard,
}

impl RateLimiter {
    /// A single-permit limiter returning its permit every `refill_interval`.
    ///
    /// # Errors
    ///
    /// [`LimitError::InvalidIntervalConfig`] if `refill_interval` is zero.
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime, which runs the refill task.
    pub fn new(scope: &CancellationToken, refill_interval: Duration) -> Result<Self, LimitError> {
        Self::with_config(scope, LimiterConfig::new(refill_interval))
    }

    /// Build a limiter from a full configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure of `config`, see [`LimiterConfig::validate`].
    ///
    /// # Panics
    ///
    /// Must be called from within a tokio runtime, which runs the refill task.
    pub fn with_config(scope: &CancellationToken, config: LimiterConfig) -> Result<Self, LimitError> {
        config.validate()?;

        let shared = Arc::new(Shared {
            state: Mutex::new(State::new(&config, Instant::now())),
            available: Notify::new(),
            reschedule: Notify::new(),
        });
        let cancel = scope.child_token();
        let refill_task = tokio::spawn(refill::run(Arc::clone(&shared), cancel.clone()));

        debug!(
            max_permits = config.max_permits,
            refill_interval = ?config.refill_interval,
            min_spacing = ?config.min_spacing,
            "rate limiter created"
        );

        Ok(Self {
            shared,
            _guard: cancel.clone().drop_guard(),
            cancel,
            refill_task: Mutex::new(Some(refill_task)),
        })
    }

    /// Attempt to take a permit without blocking.
    pub fn try_acquire(&self) -> bool {
        self.process().is_continue()
    }

    /// Like [`try_acquire`](Self::try_acquire), but says why a refusal happened and when a retry
    /// could succeed.
    pub fn process(&self) -> ControlFlow<Reason> {
        let flow = self.shared.state.lock().try_acquire(Instant::now());
        if let ControlFlow::Break(reason) = &flow {
            trace!(?reason, "acquisition refused");
        }
        flow
    }

    /// Block until a permit is taken or `cancel` fires.
    ///
    /// An already cancelled token returns [`WaitOutcome::Cancelled`] without touching the pool,
    /// even if permits are available.
    pub async fn wait(&self, cancel: &CancellationToken) -> WaitOutcome {
        if cancel.is_cancelled() {
            return WaitOutcome::Cancelled;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
            _ = self.acquire() => WaitOutcome::Acquired,
        }
    }

    /// Block until a permit is taken.
    ///
    /// Dropping the future abandons the wait. A permit is only ever consumed by the poll that
    /// completes the future, so abandoning never loses one.
    ///
    /// Waiters sleep until the refill task or a reconfiguration signals new capacity, or until
    /// the refusal's `retry_after` hint expires, whichever comes first. Concurrent waiters race
    /// for permits in no particular order.
    pub async fn acquire(&self) {
        loop {
            let notified = self.shared.available.notified();
            tokio::pin!(notified);
            // Register before checking so a refill between the check and the sleep is not missed.
            notified.as_mut().enable();

            let backoff = match self.process() {
                ControlFlow::Continue(()) => return,
                ControlFlow::Break(reason) => self.backoff(reason),
            };

            tokio::select! {
                _ = &mut notified => {}
                _ = sleep(backoff) => {}
            }
        }
    }

    /// [`acquire`](Self::acquire) on an owned handle, for futures that must be `'static`.
    pub async fn acquire_owned(self: Arc<Self>) {
        self.acquire().await
    }

    /// How long to sleep before retrying after `reason`.
    ///
    /// Normally the refusal's own `retry_after` hint. A zero hint means the refill is overdue:
    /// a live refill task is about to run, so retry shortly; a stopped one never will, and only
    /// a reconfiguration can free a permit, so retry once per refill interval.
    pub fn backoff(&self, reason: Reason) -> Duration {
        let retry_after = reason.retry_after();
        if !retry_after.is_zero() {
            retry_after
        } else if self.is_running() {
            OVERDUE_BACKOFF.min(self.refill_interval())
        } else {
            self.refill_interval()
        }
    }

    pub fn current_permits(&self) -> usize {
        self.shared.state.lock().available()
    }

    pub fn max_permits(&self) -> usize {
        self.shared.state.lock().max_permits()
    }

    pub fn refill_interval(&self) -> Duration {
        self.shared.state.lock().refill_interval()
    }

    pub fn min_spacing(&self) -> Duration {
        self.shared.state.lock().min_spacing()
    }

    /// `false` once the refill task has been told to stop.
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Change the burst capacity.
    ///
    /// Raising it lets the refill task accumulate more permits but grants none immediately.
    /// Lowering it below the current count discards the excess.
    ///
    /// # Errors
    ///
    /// [`LimitError::InvalidBurstConfig`] if `max_permits` is zero. Nothing changes.
    pub fn set_max_permits(&self, max_permits: usize) -> Result<(), LimitError> {
        self.shared.state.lock().set_max_permits(max_permits)?;
        debug!(max_permits, "burst capacity updated");
        Ok(())
    }

    /// Change the refill cadence. The running timer restarts with the new period right away.
    ///
    /// # Errors
    ///
    /// [`LimitError::InvalidIntervalConfig`] if `refill_interval` is zero. Nothing changes.
    pub fn set_refill_interval(&self, refill_interval: Duration) -> Result<(), LimitError> {
        self.shared
            .state
            .lock()
            .set_refill_interval(refill_interval, Instant::now())?;
        self.shared.reschedule.notify_one();
        debug!(?refill_interval, "refill interval updated");
        Ok(())
    }

    /// Change the minimum spacing between acquisitions. Zero disables it.
    ///
    /// The new spacing is measured from the last successful acquisition.
    pub fn set_min_spacing(&self, min_spacing: Duration) {
        self.shared.state.lock().set_min_spacing(min_spacing);
        self.shared.available.notify_waiters();
        debug!(?min_spacing, "minimum spacing updated");
    }

    /// Fill the pool back up to capacity.
    pub fn reset_permits(&self) {
        self.shared.state.lock().reset();
        self.shared.available.notify_waiters();
        debug!("permits reset");
    }

    /// Stop the refill task and wait for it to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let refill_task = self.refill_task.lock().take();
        if let Some(refill_task) = refill_task
            && let Err(err) = refill_task.await
        {
            warn!(%err, "refill task did not exit cleanly");
        }
        debug!("rate limiter shut down");
    }
}
