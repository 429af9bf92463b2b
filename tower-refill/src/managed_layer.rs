use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use refill_limit::RateLimiter;
use tower::BoxError;
use tower::Layer;
use tower::Service;
use tower::util::BoxCloneSyncService;
use tower::util::MapErr;

use crate::RefillError;
use crate::RefillLimitService;

/// A pre-composed stack for servers: wait for a permit, but never for longer than `max_wait`.
///
/// Every error leaving the stack is a [`RefillError`]:
/// - **`RateLimited { retry_after }`**: the limiter's hint says no permit can arrive within
///   `max_wait`, either because the pool is exhausted or because the minimum spacing has not
///   elapsed. Refused at once rather than after a pointless wait.
/// - **`Timeout`**: the hint looked reachable but the permit went to someone else before
///   `max_wait` ran out.
/// - **`Inner`**: any error from the inner service, which itself is not time-bounded.
pub struct ManagedRefillLayer<Req> {
    limiter: Arc<RateLimiter>,
    max_wait: Duration,
    _phantom: PhantomData<fn(Req)>,
}

// Deriving Clone would require `Req: Clone`.
impl<Req> Clone for ManagedRefillLayer<Req> {
    fn clone(&self) -> Self {
        Self {
            limiter: Arc::clone(&self.limiter),
            max_wait: self.max_wait,
            _phantom: PhantomData,
        }
    }
}

impl<Req> ManagedRefillLayer<Req> {
    pub fn new(limiter: Arc<RateLimiter>, max_wait: Duration) -> Self {
        Self {
            limiter,
            max_wait,
            _phantom: PhantomData,
        }
    }
}

fn into_refill_error(err: BoxError) -> BoxError {
    if err.is::<RefillError>() {
        err
    } else {
        Box::new(RefillError::Inner(err.to_string()))
    }
}

impl<S, Req> Layer<S> for ManagedRefillLayer<Req>
where
    S: Service<Req, Error = BoxError> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    S::Response: 'static,
    Req: Send + 'static,
{
    type Service = BoxCloneSyncService<Req, S::Response, BoxError>;

    fn layer(&self, inner: S) -> Self::Service {
        let svc = RefillLimitService::new(inner, Arc::clone(&self.limiter))
            .with_timeout(self.max_wait)
            .with_early_rejection(true);

        BoxCloneSyncService::new(MapErr::new(
            svc,
            into_refill_error as fn(BoxError) -> BoxError,
        ))
    }
}
