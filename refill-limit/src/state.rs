use std::ops::ControlFlow;
use std::time::Duration;

use tokio::time::Instant;

use crate::LimitError;
use crate::LimiterConfig;
use crate::Reason;
use crate::config::validate_max_permits;
use crate::config::validate_refill_interval;

/// Roughly 30 years, the horizon tokio's own timers saturate to.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `start + after`, saturating to a far-future instant instead of overflowing.
fn deadline(start: Instant, after: Duration) -> Instant {
    start
        .checked_add(after)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

/// Outcome of a refill timer firing.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Tick {
    /// An acquisition pushed the deadline back while the timer was sleeping.
    Early,
    /// One permit was returned to the pool.
    Granted { available: usize },
    /// The pool was already at capacity.
    Full,
}

/// Everything the limiter mutates. Always accessed under the limiter's lock.
#[derive(Debug)]
pub(crate) struct State {
    available: usize,
    max_permits: usize,
    refill_interval: Duration,
    min_spacing: Duration,
    last_acquired: Option<Instant>,
    next_refill: Instant,
}

impl State {
    /// `config` must already be validated.
    pub(crate) fn new(config: &LimiterConfig, now: Instant) -> Self {
        Self {
            available: config.max_permits,
            max_permits: config.max_permits,
            refill_interval: config.refill_interval,
            min_spacing: config.min_spacing,
            last_acquired: None,
            next_refill: deadline(now, config.refill_interval),
        }
    }

    pub(crate) fn available(&self) -> usize {
        self.available
    }

    pub(crate) fn max_permits(&self) -> usize {
        self.max_permits
    }

    pub(crate) fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    pub(crate) fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    pub(crate) fn next_refill(&self) -> Instant {
        self.next_refill
    }

    /// Instant before which an acquisition is refused regardless of permits.
    pub(crate) fn next_eligible(&self) -> Option<Instant> {
        if self.min_spacing.is_zero() {
            return None;
        }
        self.last_acquired.map(|last| deadline(last, self.min_spacing))
    }

    /// Consume one permit if one is available and the spacing window has passed.
    ///
    /// A successful acquisition restarts the refill phase, so the next permit comes back a
    /// full interval after the most recent consumption.
    pub(crate) fn try_acquire(&mut self, now: Instant) -> ControlFlow<Reason> {
        let spacing_wait = self
            .next_eligible()
            .map(|eligible| eligible.saturating_duration_since(now))
            .unwrap_or_default();

        if self.available == 0 {
            let refill_wait = self.next_refill.saturating_duration_since(now);
            return ControlFlow::Break(Reason::Exhausted {
                retry_after: refill_wait.max(spacing_wait),
            });
        }

        if !spacing_wait.is_zero() {
            return ControlFlow::Break(Reason::TooSoon {
                retry_after: spacing_wait,
            });
        }

        self.available -= 1;
        self.last_acquired = Some(now);
        self.next_refill = deadline(now, self.refill_interval);
        ControlFlow::Continue(())
    }

    /// Called when the refill timer fires.
    pub(crate) fn refill(&mut self, now: Instant) -> Tick {
        if now < self.next_refill {
            return Tick::Early;
        }

        self.next_refill = deadline(now, self.refill_interval);
        if self.available < self.max_permits {
            self.available += 1;
            Tick::Granted {
                available: self.available,
            }
        } else {
            Tick::Full
        }
    }

    /// Raising the ceiling keeps the current count. Lowering it clamps the count.
    pub(crate) fn set_max_permits(&mut self, max_permits: usize) -> Result<(), LimitError> {
        validate_max_permits(max_permits)?;
        self.max_permits = max_permits;
        self.available = self.available.min(max_permits);
        Ok(())
    }

    /// The new period takes effect from `now`, not from the previous deadline.
    pub(crate) fn set_refill_interval(
        &mut self,
        refill_interval: Duration,
        now: Instant,
    ) -> Result<(), LimitError> {
        validate_refill_interval(refill_interval)?;
        self.refill_interval = refill_interval;
        self.next_refill = deadline(now, refill_interval);
        Ok(())
    }

    pub(crate) fn set_min_spacing(&mut self, min_spacing: Duration) {
        self.min_spacing = min_spacing;
    }

    pub(crate) fn reset(&mut self) {
        self.available = self.max_permits;
    }
}
