use std::{
    future::Future,
    time::{Duration, Instant},
};

use futures::{FutureExt, future};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    PacelineError,
    common::{Dispatch, LimiterOptions, pacing_interval, total_for_duration},
    pacer::Pacer,
    runtime,
};

/// Runs a unit of async work at a fixed pace.
///
/// A limiter permits `rate` operations per `resolution`. It derives a pacing
/// interval of `resolution / rate` once, at construction, and starts a background
/// tick source that fires every interval until the limiter is dropped. Each
/// dispatch consumes exactly one tick. Unclaimed ticks are kept only up to one
/// timer step (a single tick for intervals of 1ms and above), so a pause between
/// two runs does not build up credit for a burst.
///
/// A `rate` of zero or below disables pacing entirely and work is dispatched as fast
/// as the runtime allows.
///
/// # Dispatch
///
/// See [`Dispatch`]. With [`Dispatch::Concurrent`] (the default) every invocation is
/// spawned as its own task. All launched tasks are awaited before a run returns,
/// including when it stops early because of an error or cancellation. With
/// [`Dispatch::Sequential`] each invocation finishes before the next pacing wait.
///
/// # Errors and cancellation
///
/// The first error returned by the work unit ends the run and is handed back to the
/// caller. Later errors are discarded. Cancellation is not an error: a cancelled run
/// returns `Ok(())`, so `Ok(())` alone does not tell a completed run from a cut-short
/// one. Check [`CancellationToken::is_cancelled`] if the difference matters.
///
/// The work unit's error type must convert from [`PacelineError`]. If the tick
/// source dies, which happens when the runtime that created the limiter has shut
/// down, the run stops and returns [`PacelineError::PacerStopped`] converted into `E`.
///
/// # Examples
///
/// ```
/// use std::sync::{
///     Arc,
///     atomic::{AtomicU64, Ordering},
/// };
/// use std::time::Duration;
///
/// use paceline::Limiter;
///
/// type BoxError = Box<dyn std::error::Error + Send + Sync>;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), BoxError> {
/// // 100 operations per second, one every 10ms.
/// let limiter = Limiter::new(100, Duration::from_secs(1))?;
/// let calls = Arc::new(AtomicU64::new(0));
///
/// limiter
///     .run_fixed_count(None, 5, || {
///         let calls = calls.clone();
///         async move {
///             calls.fetch_add(1, Ordering::Relaxed);
///             Ok::<(), BoxError>(())
///         }
///     })
///     .await?;
///
/// assert_eq!(calls.load(Ordering::Relaxed), 5);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Limiter {
    rate: i64,
    resolution: Duration,
    interval: Duration,
    dispatch: Dispatch,
    pacer: Option<Pacer>,
}

/// Outcome of waiting for permission to dispatch.
enum Slot<E> {
    Granted,
    Cancelled,
    Failed(E),
    PacerGone,
}

/// When a run stops dispatching.
#[derive(Debug, Clone, Copy)]
enum Budget {
    Count(u64),
    Until(Instant),
}

impl Budget {
    fn allows(&self, dispatched: u64) -> bool {
        match self {
            Self::Count(total) => dispatched < *total,
            Self::Until(deadline) => Instant::now() < *deadline,
        }
    }
}

impl Limiter {
    /// Create a limiter allowing `rate` operations per `resolution`, dispatching
    /// concurrently.
    ///
    /// When `rate > 0` the tick source starts immediately, so this must be called
    /// from within the async runtime selected by the crate features.
    ///
    /// # Errors
    ///
    /// - [`PacelineError::InvalidResolution`] if `rate > 0` and `resolution` is zero.
    /// - [`PacelineError::InvalidInterval`] if `resolution / rate` truncates to zero.
    /// - [`PacelineError::RuntimeUnavailable`] if `rate > 0` and there is no runtime.
    pub fn new(rate: i64, resolution: Duration) -> Result<Self, PacelineError> {
        Self::with_options(LimiterOptions {
            rate,
            resolution,
            ..LimiterOptions::default()
        })
    }

    /// Create a limiter from [`LimiterOptions`]. Fails like [`Limiter::new`].
    pub fn with_options(options: LimiterOptions) -> Result<Self, PacelineError> {
        let LimiterOptions {
            rate,
            resolution,
            dispatch,
        } = options;

        let Ok(pace) = u64::try_from(rate) else {
            return Ok(Self::unthrottled(rate, resolution, dispatch));
        };

        if pace == 0 {
            return Ok(Self::unthrottled(rate, resolution, dispatch));
        }

        if resolution.is_zero() {
            return Err(PacelineError::InvalidResolution(format!(
                "resolution must be greater than 0 when rate is {rate}"
            )));
        }

        let interval = pacing_interval(pace, resolution);
        if interval.is_zero() {
            return Err(PacelineError::InvalidInterval(format!(
                "{resolution:?} / {rate} truncates to a zero pacing interval"
            )));
        }

        if !runtime::runtime_available() {
            return Err(PacelineError::RuntimeUnavailable(
                "a throttled limiter must be created from within an async runtime".to_string(),
            ));
        }

        Ok(Self {
            rate,
            resolution,
            interval,
            dispatch,
            pacer: Some(Pacer::start(interval)),
        })
    } // end constructor

    fn unthrottled(rate: i64, resolution: Duration, dispatch: Dispatch) -> Self {
        Self {
            rate,
            resolution,
            interval: Duration::ZERO,
            dispatch,
            pacer: None,
        }
    }

    /// Operations permitted per [`resolution`](Self::resolution).
    pub fn rate(&self) -> i64 {
        self.rate
    }

    /// Window over which [`rate`](Self::rate) operations are permitted.
    pub fn resolution(&self) -> Duration {
        self.resolution
    }

    /// Spacing between two dispatches. [`Duration::ZERO`] when unthrottled.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Dispatch discipline of this limiter.
    pub fn dispatch(&self) -> Dispatch {
        self.dispatch
    }

    /// Whether dispatches wait for pacing ticks.
    pub fn is_throttled(&self) -> bool {
        self.pacer.is_some()
    }

    /// Invoke `work` `total` times, one invocation per pacing tick.
    ///
    /// With 10 operations per second and a `total` of 50 this takes about five
    /// seconds. Returns the first error produced by `work`, or `Ok(())` once every
    /// invocation has finished or `cancel` has fired.
    ///
    /// # Errors
    ///
    /// The first error produced by `work`, or [`PacelineError::PacerStopped`] if the
    /// tick source is gone.
    ///
    /// `work` is called once per dispatch to build the future for that invocation.
    pub async fn run_fixed_count<F, Fut, E>(
        &self,
        cancel: Option<&CancellationToken>,
        total: u64,
        work: F,
    ) -> Result<(), E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: From<PacelineError> + Send + 'static,
    {
        self.run(cancel, Budget::Count(total), work).await
    } // end method run_fixed_count

    /// Invoke `work` at the configured pace for `duration`.
    ///
    /// A throttled limiter performs `floor(duration / resolution) * rate`
    /// invocations: with 10 operations per second and three seconds that is 30.
    /// The count is fixed up front, so slow invocations under
    /// [`Dispatch::Sequential`] can stretch the run past `duration`.
    ///
    /// An unthrottled limiter keeps dispatching until `duration` has elapsed.
    ///
    /// A zero `duration` returns `Ok(())` without invoking `work`. Errors and
    /// cancellation behave as in [`run_fixed_count`](Self::run_fixed_count).
    pub async fn run_for_duration<F, Fut, E>(
        &self,
        cancel: Option<&CancellationToken>,
        duration: Duration,
        work: F,
    ) -> Result<(), E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: From<PacelineError> + Send + 'static,
    {
        if duration.is_zero() {
            return Ok(());
        }

        let budget = if self.is_throttled() {
            Budget::Count(total_for_duration(self.rate, self.resolution, duration))
        } else {
            Instant::now()
                .checked_add(duration)
                .map_or(Budget::Count(u64::MAX), Budget::Until)
        };

        self.run(cancel, budget, work).await
    } // end method run_for_duration

    async fn run<F, Fut, E>(
        &self,
        cancel: Option<&CancellationToken>,
        budget: Budget,
        work: F,
    ) -> Result<(), E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: From<PacelineError> + Send + 'static,
    {
        tracing::debug!(
            rate = self.rate,
            interval = ?self.interval,
            dispatch = ?self.dispatch,
            ?budget,
            "limiter.run.start"
        );

        match self.dispatch {
            Dispatch::Concurrent => self.run_concurrent(cancel, budget, work).await,
            Dispatch::Sequential => self.run_sequential(cancel, budget, work).await,
        }
    } // end method run

    async fn run_sequential<F, Fut, E>(
        &self,
        cancel: Option<&CancellationToken>,
        budget: Budget,
        mut work: F,
    ) -> Result<(), E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: From<PacelineError>,
    {
        let mut dispatched = 0u64;

        while budget.allows(dispatched) {
            match self.acquire::<E>(cancel, None).await {
                Slot::Granted => {}
                Slot::Failed(err) => return Err(err),
                Slot::Cancelled => break,
                Slot::PacerGone => return Err(pacer_stopped(dispatched).into()),
            }

            tracing::trace!(dispatched, "limiter.dispatch");
            dispatched += 1;

            if let Err(err) = work().await {
                tracing::debug!(dispatched, "limiter.run.failed");
                return Err(err);
            }

            if !self.is_throttled() {
                runtime::yield_now().await;
            }
        }

        tracing::debug!(dispatched, "limiter.run.done");
        Ok(())
    } // end method run_sequential

    async fn run_concurrent<F, Fut, E>(
        &self,
        cancel: Option<&CancellationToken>,
        budget: Budget,
        mut work: F,
    ) -> Result<(), E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: From<PacelineError> + Send + 'static,
    {
        // Every launched task owns a sender. The receiver yields `None` only after all
        // of them have finished, which makes the channel double as the wait group.
        let (errors_tx, mut errors_rx) = mpsc::unbounded_channel::<E>();
        let mut first_error: Option<E> = None;
        let mut dispatched = 0u64;

        while budget.allows(dispatched) {
            match self.acquire(cancel, Some(&mut errors_rx)).await {
                Slot::Granted => {}
                Slot::Failed(err) => {
                    first_error = Some(err);
                    break;
                }
                Slot::Cancelled => break,
                Slot::PacerGone => {
                    first_error = Some(pacer_stopped(dispatched).into());
                    break;
                }
            }

            tracing::trace!(dispatched, "limiter.dispatch");
            dispatched += 1;

            let fut = work();
            let errors_tx = errors_tx.clone();
            runtime::spawn_task(async move {
                if let Err(err) = fut.await {
                    let _ = errors_tx.send(err);
                }
            });

            if !self.is_throttled() {
                runtime::yield_now().await;
            }
        }

        drop(errors_tx);

        while let Some(err) = errors_rx.recv().await {
            if first_error.is_none() {
                first_error = Some(err);
            }
        }

        match first_error {
            Some(err) => {
                tracing::debug!(dispatched, "limiter.run.failed");
                Err(err)
            }
            None => {
                tracing::debug!(dispatched, "limiter.run.done");
                Ok(())
            }
        }
    } // end method run_concurrent

    /// Wait for the next pacing tick, giving way to cancellation and reported errors.
    ///
    /// Cancellation is checked first, then errors, then the tick, so an already
    /// cancelled token never consumes a tick.
    async fn acquire<E>(
        &self,
        cancel: Option<&CancellationToken>,
        errors: Option<&mut mpsc::UnboundedReceiver<E>>,
    ) -> Slot<E> {
        let cancelled = async {
            match cancel {
                Some(token) => token.cancelled().await,
                None => future::pending().await,
            }
        }
        .fuse();

        let failed = async {
            match errors {
                Some(rx) => match rx.recv().await {
                    Some(err) => err,
                    None => future::pending().await,
                },
                None => future::pending().await,
            }
        }
        .fuse();

        let ticked = async {
            match &self.pacer {
                Some(pacer) => pacer.wait().await,
                None => true,
            }
        }
        .fuse();

        futures::pin_mut!(cancelled, failed, ticked);

        futures::select_biased! {
            () = cancelled => Slot::Cancelled,
            err = failed => Slot::Failed(err),
            granted = ticked => {
                if granted {
                    Slot::Granted
                } else {
                    tracing::warn!("limiter.pacer.gone");
                    Slot::PacerGone
                }
            }
        }
    } // end method acquire
} // end of impl

fn pacer_stopped(dispatched: u64) -> PacelineError {
    PacelineError::PacerStopped(format!(
        "tick source ended after {dispatched} dispatches, was the runtime shut down?"
    ))
}
