//! Cooperative cancellation for limiter runs.
//!
//! Runs take a [`CancellationToken`]. A limiter only observes the token between
//! dispatches: work that is already running is never interrupted, and a cancelled
//! run returns `Ok(())`.

use std::time::Duration;

pub use tokio_util::sync::CancellationToken;

use crate::{PacelineError, runtime};

/// Cancel `token` once `after` has elapsed.
///
/// Spawns a timer task on the active runtime. The task ends early if the token is
/// cancelled some other way first.
///
/// # Errors
///
/// [`PacelineError::RuntimeUnavailable`] if there is no runtime to host the timer.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use paceline::{CancellationToken, cancel_after};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let token = CancellationToken::new();
/// cancel_after(&token, Duration::from_millis(10)).unwrap();
///
/// token.cancelled().await;
/// assert!(token.is_cancelled());
/// # }
/// ```
pub fn cancel_after(token: &CancellationToken, after: Duration) -> Result<(), PacelineError> {
    if !runtime::runtime_available() {
        return Err(PacelineError::RuntimeUnavailable(
            "cancel_after must be called from within an async runtime".to_string(),
        ));
    }

    let token = token.clone();
    runtime::spawn_task(async move {
        let elapsed = runtime::sleep(after);
        let cancelled = token.cancelled();
        futures::pin_mut!(elapsed, cancelled);

        if let futures::future::Either::Left(_) = futures::future::select(elapsed, cancelled).await {
            tracing::debug!(?after, "cancel_after.fired");
            token.cancel();
        }
    });

    Ok(())
}
