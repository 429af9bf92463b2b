use std::sync::Arc;
use std::time::Duration;

use refill_limit::RateLimiter;
use tower::Layer;

use crate::service::RefillLimitService;

/// Admits requests through a shared [`RateLimiter`].
#[derive(Clone, Debug)]
pub struct RefillLimitLayer {
    limiter: Arc<RateLimiter>,
    fail_fast: bool,
    early_rejection: bool,
    timeout: Option<Duration>,
}

impl RefillLimitLayer {
    /// Create a RefillLimitLayer
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        RefillLimitLayer {
            limiter,
            fail_fast: false,
            early_rejection: false,
            timeout: None,
        }
    }

    /// Refuse immediately with `RefillError::RateLimited` when no permit is available,
    /// instead of waiting for a refill.
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// With a timeout set, refuse with `RefillError::RateLimited` as soon as the limiter's
    /// hint shows no permit can arrive before the timeout.
    pub fn with_early_rejection(mut self, early_rejection: bool) -> Self {
        self.early_rejection = early_rejection;
        self
    }

    /// Give up waiting for a permit after `timeout`, failing with `RefillError::Timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl<S> Layer<S> for RefillLimitLayer {
    type Service = RefillLimitService<S>;

    fn layer(&self, service: S) -> Self::Service {
        let mut svc = RefillLimitService::new(service, self.limiter.clone())
            .with_fail_fast(self.fail_fast)
            .with_early_rejection(self.early_rejection);
        if let Some(timeout) = self.timeout {
            svc = svc.with_timeout(timeout);
        }
        svc
    }
}
