use std::{sync::Arc, time::Duration};

use tokio::sync::{Semaphore, oneshot};

use crate::runtime::{new_interval, spawn_task, tick};

/// Coarsest wakeup step of the runtime timers.
const TIMER_GRANULARITY: Duration = Duration::from_millis(1);

/// Background tick source shared by every run of one limiter.
///
/// A spawned task ticks every `interval` and turns each tick into one semaphore
/// permit. Waiters take a permit and forget it, so every tick is handed to exactly
/// one waiter. Unclaimed permits are capped at one timer step worth of ticks (a
/// single tick for intervals of 1ms and above), so idle time never turns into a
/// burst while sub-millisecond intervals still reach their rate.
///
/// The task exits as soon as the pacer is dropped. If the runtime drops the task
/// instead, the semaphore is closed and waiters see [`Pacer::wait`] return `false`.
#[derive(Debug)]
pub(crate) struct Pacer {
    permits: Arc<Semaphore>,
    _stop: oneshot::Sender<()>,
}

/// Closes the permit semaphore when the tick task goes away, however that happens.
struct CloseOnDrop(Arc<Semaphore>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

impl Pacer {
    pub(crate) fn start(interval: Duration) -> Self {
        let capacity = burst_capacity(interval);
        let permits = Arc::new(Semaphore::new(0));
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let ticks = CloseOnDrop(permits.clone());

        spawn_task(async move {
            let ticks = ticks;
            let mut ticker = new_interval(interval);

            loop {
                let tick_fut = tick(&mut ticker);
                futures::pin_mut!(tick_fut);

                match futures::future::select(tick_fut, &mut stop_rx).await {
                    futures::future::Either::Left(((), _stop_fut)) => {
                        if ticks.0.available_permits() < capacity {
                            ticks.0.add_permits(1);
                        }
                    }
                    futures::future::Either::Right((_stopped, _tick_fut)) => break,
                }
            }

            tracing::trace!(?interval, "pacer.stopped");
        });

        Self {
            permits,
            _stop: stop_tx,
        }
    } // end constructor

    /// Wait for the next tick. Each tick is handed to exactly one waiter.
    ///
    /// Returns `false` if the tick task is gone, which happens when the runtime
    /// it was spawned on has shut down.
    pub(crate) async fn wait(&self) -> bool {
        match self.permits.acquire().await {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_closed) => false,
        }
    } // end method wait
} // end impl Pacer

/// Ticks that fit in one timer step, at least one.
pub(crate) fn burst_capacity(interval: Duration) -> usize {
    if interval.is_zero() {
        return 1;
    }

    let ticks = TIMER_GRANULARITY.as_nanos().div_ceil(interval.as_nanos());
    usize::try_from(ticks).unwrap_or(usize::MAX).max(1)
}
