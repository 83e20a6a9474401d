use std::time::Duration;

/// How a [`Limiter`](crate::Limiter) runs the work unit once a pacing slot is granted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Dispatch {
    /// Every invocation is spawned as its own task.
    ///
    /// Launch order follows tick order, completion order is unspecified. Reaches the
    /// configured rate even when a single invocation takes longer than the interval.
    #[default]
    Concurrent,
    /// Every invocation runs to completion before the next pacing wait begins.
    ///
    /// Invocations never overlap. The configured rate is only reached when each
    /// invocation finishes well within one interval.
    Sequential,
}

/// Configuration for [`Limiter`](crate::Limiter).
#[derive(Debug, Clone)]
pub struct LimiterOptions {
    /// Operations permitted per `resolution`. Zero or negative disables pacing.
    pub rate: i64,
    /// Window over which `rate` operations are permitted.
    pub resolution: Duration,
    /// Dispatch discipline.
    pub dispatch: Dispatch,
}

impl Default for LimiterOptions {
    /// Unthrottled, one second resolution, concurrent dispatch.
    fn default() -> Self {
        Self {
            rate: 0,
            resolution: Duration::from_secs(1),
            dispatch: Dispatch::default(),
        }
    }
}

/// Minimum spacing between two dispatches for `rate` operations per `resolution`.
///
/// Integer division on nanoseconds, truncated toward zero:
///
/// ```
/// use std::time::Duration;
/// use paceline::pacing_interval;
///
/// assert_eq!(pacing_interval(60, Duration::from_secs(3600)), Duration::from_secs(60));
/// assert_eq!(pacing_interval(1000, Duration::from_micros(1)), Duration::from_nanos(1));
/// assert_eq!(pacing_interval(3, Duration::from_nanos(10)), Duration::from_nanos(3));
/// ```
///
/// A `rate` of zero yields [`Duration::ZERO`].
pub fn pacing_interval(rate: u64, resolution: Duration) -> Duration {
    if rate == 0 {
        return Duration::ZERO;
    }

    let nanos = resolution.as_nanos() / u128::from(rate);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Number of operations that fit in `duration`: `floor(duration / resolution) * rate`.
///
/// Returns `0` when `rate <= 0` or `resolution` is zero. Saturates at `u64::MAX`.
///
/// ```
/// use std::time::Duration;
/// use paceline::total_for_duration;
///
/// let total = total_for_duration(10, Duration::from_secs(1), Duration::from_secs(3));
/// assert_eq!(total, 30);
/// ```
pub fn total_for_duration(rate: i64, resolution: Duration, duration: Duration) -> u64 {
    let Ok(rate) = u64::try_from(rate) else {
        return 0;
    };

    if rate == 0 || resolution.is_zero() {
        return 0;
    }

    let windows = duration.as_nanos() / resolution.as_nanos();
    u64::try_from(windows)
        .unwrap_or(u64::MAX)
        .saturating_mul(rate)
}
