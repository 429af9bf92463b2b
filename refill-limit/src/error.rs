/// Errors produced when configuring a [`RateLimiter`](crate::RateLimiter).
///
/// These are only ever returned synchronously, from construction or from one of the
/// runtime setters. Running out of permits is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LimitError {
    /// The burst capacity was zero. A limiter must be able to hold at least one permit.
    #[error("burst capacity must be greater than 0")]
    InvalidBurstConfig,

    /// The refill interval was zero.
    #[error("refill interval must be greater than 0")]
    InvalidIntervalConfig,
}
