use std::{future::Future, time::Duration};

#[cfg(not(any(feature = "rt-tokio", feature = "rt-smol")))]
compile_error!("paceline needs a runtime backend: enable the `rt-tokio` or `rt-smol` feature");

#[cfg(feature = "rt-tokio")]
pub(crate) type Interval = tokio::time::Interval;

#[cfg(all(feature = "rt-smol", not(feature = "rt-tokio")))]
pub(crate) type Interval = smol::Timer;

/// Periodic timer whose first tick lands one `period` from now.
///
/// Ticks stay anchored to the start: when the timer wakes late, the missed ticks
/// are delivered back to back so the long-run tick count matches `period`.
#[cfg(feature = "rt-tokio")]
pub(crate) fn new_interval(period: Duration) -> Interval {
    let start = tokio::time::Instant::now() + period;
    let mut interval = tokio::time::interval_at(start, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Burst);
    interval
}

#[cfg(all(feature = "rt-smol", not(feature = "rt-tokio")))]
pub(crate) fn new_interval(period: Duration) -> Interval {
    smol::Timer::interval(period)
}

#[cfg(feature = "rt-tokio")]
pub(crate) async fn tick(interval: &mut Interval) {
    interval.tick().await;
}

#[cfg(all(feature = "rt-smol", not(feature = "rt-tokio")))]
pub(crate) async fn tick(interval: &mut Interval) {
    use futures::StreamExt;
    interval.next().await;
}

#[cfg(feature = "rt-tokio")]
pub(crate) fn spawn_task<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(fut);
}

#[cfg(all(feature = "rt-smol", not(feature = "rt-tokio")))]
pub(crate) fn spawn_task<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    smol::spawn(fut).detach();
}

/// Whether [`spawn_task`] can be called from the current context.
#[cfg(feature = "rt-tokio")]
pub(crate) fn runtime_available() -> bool {
    tokio::runtime::Handle::try_current().is_ok()
}

#[cfg(all(feature = "rt-smol", not(feature = "rt-tokio")))]
pub(crate) fn runtime_available() -> bool {
    true
}

#[cfg(feature = "rt-tokio")]
pub(crate) async fn sleep(d: Duration) {
    tokio::time::sleep(d).await;
}

#[cfg(all(feature = "rt-smol", not(feature = "rt-tokio")))]
pub(crate) async fn sleep(d: Duration) {
    smol::Timer::after(d).await;
}

#[cfg(feature = "rt-tokio")]
pub(crate) async fn yield_now() {
    tokio::task::yield_now().await;
}

#[cfg(all(feature = "rt-smol", not(feature = "rt-tokio")))]
pub(crate) async fn yield_now() {
    smol::future::yield_now().await;
}
