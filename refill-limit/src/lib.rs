//! # refill-limit
//!
//! `refill-limit` provides a self-refilling token bucket for in-process admission control.
//!
//! ## Core Philosophy
//!
//! The bucket is refilled by a background task rather than lazily on each request. Every
//! successful acquisition restarts that task's timer, so refill measures time since the last
//! acquisition instead of ticking on a fixed grid. All state lives behind a single lock that is
//! never held across an `.await`.
//!
//! ## Key Concepts
//!
//! * **Permits**: the pool starts full at `max_permits` and gains one permit per
//!   `refill_interval`, up to `max_permits`.
//! * **Minimum spacing**: an optional second throttle refusing acquisitions that follow the
//!   previous one too closely, even with permits left.
//! * **Cancellation scope**: the refill task runs until the [`CancellationToken`] given at
//!   construction is cancelled, the limiter is shut down, or it is dropped. It never restarts.
//! * **Blocking wait**: [`RateLimiter::wait`] parks until a refill or reconfiguration signals new
//!   capacity, instead of spinning.
//!
//! ## Example
//!
//! ```rust
//! use std::time::Duration;
//!
//! use refill_limit::CancellationToken;
//! use refill_limit::LimiterConfig;
//! use refill_limit::RateLimiter;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), refill_limit::LimitError> {
//! let scope = CancellationToken::new();
//! let config = LimiterConfig::new(Duration::from_millis(100)).with_max_permits(10);
//! let limiter = RateLimiter::with_config(&scope, config)?;
//!
//! if limiter.try_acquire() {
//!     // Request allowed
//! }
//!
//! if limiter.wait(&scope).await.is_acquired() {
//!     // Waited for a permit
//! }
//!
//! scope.cancel();
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

mod config;
mod error;
mod limiter;
mod refill;
mod state;

pub use config::LimiterConfig;
pub use error::LimitError;
pub use limiter::RateLimiter;
pub use limiter::WaitOutcome;
pub use tokio_util::sync::CancellationToken;

/// Reasons why an acquisition might be refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// No permits are left. `retry_after` is the time until the next scheduled refill, or
    /// until the spacing window closes if that is later.
    Exhausted { retry_after: Duration },
    /// Permits are available, but the previous acquisition was too recent.
    TooSoon { retry_after: Duration },
}

impl Reason {
    /// Earliest point, relative to now, at which a retry could succeed.
    ///
    /// This is a hint. Other callers may take the permit first, and a stopped limiter never
    /// refills.
    pub fn retry_after(&self) -> Duration {
        match self {
            Self::Exhausted { retry_after } | Self::TooSoon { retry_after } => *retry_after,
        }
    }
}
