use std::sync::Arc;

use tokio::time::Instant;
use tokio::time::sleep_until;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use crate::limiter::Shared;
use crate::state::Tick;

/// Background task returning one permit per refill interval.
///
/// The timer sleeps until the state's refill deadline. Acquisitions push that deadline back
/// without waking the task, so a wake-up may turn out to be early and simply re-arms the
/// timer. `set_refill_interval` can pull the deadline forward and does wake the task through
/// `reschedule`.
///
/// Runs until `shutdown` is cancelled. There is no restart.
pub(crate) async fn run(shared: Arc<Shared>, shutdown: CancellationToken) {
    debug!("refill task started");

    let timer = sleep_until(shared.state.lock().next_refill());
    tokio::pin!(timer);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            _ = shared.reschedule.notified() => {}

            _ = &mut timer => {
                let tick = shared.state.lock().refill(Instant::now());
                match tick {
                    Tick::Granted { available } => {
                        trace!(available, "permit refilled");
                        shared.available.notify_waiters();
                    }
                    Tick::Full => trace!("refill skipped, pool is full"),
                    Tick::Early => {}
                }
            }
        }

        let deadline = shared.state.lock().next_refill();
        timer.as_mut().reset(deadline);
    }

    debug!("refill task stopped");
}
