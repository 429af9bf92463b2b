use std::fmt;
use std::future::Future;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use opentelemetry::global;
use opentelemetry::metrics::Counter;
use refill_limit::RateLimiter;
use tokio::time::Instant;
use tokio::time::Sleep;
use tokio::time::sleep;
use tower::BoxError;
use tower::Service;
use tracing::trace;

use crate::error::RefillError;

#[derive(Clone, Debug)]
struct RefillLimitServiceMetrics {
    rejected: Counter<u64>,
    timed_out: Counter<u64>,
}

/// Holds each request in `poll_ready` until the limiter grants a permit.
///
/// While no permit is available the service sleeps for the limiter's `retry_after` hint and
/// tries again. With `fail_fast` it refuses straight away, and with a timeout it gives up once
/// the wait exceeds it. With `early_rejection` as well, a request whose hint already lies
/// beyond the remaining timeout is refused at once instead of sleeping towards a certain
/// timeout.
pub struct RefillLimitService<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
    sleep: Option<Pin<Box<Sleep>>>,
    permit_acquired: bool,
    fail_fast: bool,
    early_rejection: bool,
    timeout: Option<Duration>,
    wait_start: Option<Instant>,
    instruments: RefillLimitServiceMetrics,
}

impl<S: fmt::Debug> fmt::Debug for RefillLimitService<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefillLimitService")
            .field("inner", &self.inner)
            .field("limiter", &self.limiter)
            .field("permit_acquired", &self.permit_acquired)
            .field("fail_fast", &self.fail_fast)
            .field("early_rejection", &self.early_rejection)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

// A clone starts without a permit or a pending sleep.
impl<S: Clone> Clone for RefillLimitService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            limiter: Arc::clone(&self.limiter),
            sleep: None,
            permit_acquired: false,
            fail_fast: self.fail_fast,
            early_rejection: self.early_rejection,
            timeout: self.timeout,
            wait_start: None,
            instruments: self.instruments.clone(),
        }
    }
}

impl<S, Req> Service<Req> for RefillLimitService<S>
where
    S: Service<Req, Error = BoxError>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if let Some(fut) = self.sleep.as_mut() {
            match fut.as_mut().poll(cx) {
                Poll::Ready(()) => self.sleep = None,
                Poll::Pending => return Poll::Pending,
            }
        }

        // Inner readiness first, so a permit is never held by a service that cannot use it.
        match self.inner.poll_ready(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
            Poll::Ready(Ok(())) => {}
        }

        if self.permit_acquired {
            return Poll::Ready(Ok(()));
        }

        let reason = match self.limiter.process() {
            ControlFlow::Continue(()) => {
                self.permit_acquired = true;
                self.wait_start = None;
                return Poll::Ready(Ok(()));
            }
            ControlFlow::Break(reason) => reason,
        };

        if self.fail_fast {
            return Poll::Ready(Err(self.reject(reason.retry_after())));
        }

        let start = *self.wait_start.get_or_insert_with(Instant::now);
        let mut delay = self.limiter.backoff(reason);
        if let Some(timeout) = self.timeout {
            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                self.wait_start = None;
                self.instruments.timed_out.add(1, &[]);
                return Poll::Ready(Err(Box::new(RefillError::Timeout)));
            }
            if self.early_rejection && reason.retry_after() > remaining {
                self.wait_start = None;
                return Poll::Ready(Err(self.reject(reason.retry_after())));
            }
            delay = delay.min(remaining);
        }

        trace!(?reason, ?delay, "waiting for a permit");
        let mut fut = Box::pin(sleep(delay));
        if fut.as_mut().poll(cx).is_ready() {
            // Already elapsed; try again on the next poll.
            cx.waker().wake_by_ref();
        } else {
            self.sleep = Some(fut);
        }
        Poll::Pending
    }

    fn call(&mut self, req: Req) -> Self::Future {
        self.permit_acquired = false;
        self.inner.call(req)
    }
}

impl<S> RefillLimitService<S> {
    fn reject(&self, retry_after: Duration) -> BoxError {
        self.instruments.rejected.add(1, &[]);
        Box::new(RefillError::RateLimited { retry_after })
    }

    pub fn new(inner: S, limiter: Arc<RateLimiter>) -> Self {
        let meter = global::meter("refill_limit_service");
        let instruments = RefillLimitServiceMetrics {
            rejected: meter.u64_counter("rejected").build(),
            timed_out: meter.u64_counter("timed_out").build(),
        };

        Self {
            inner,
            limiter,
            sleep: None,
            permit_acquired: false,
            fail_fast: false,
            early_rejection: false,
            timeout: None,
            wait_start: None,
            instruments,
        }
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn with_early_rejection(mut self, early_rejection: bool) -> Self {
        self.early_rejection = early_rejection;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}
