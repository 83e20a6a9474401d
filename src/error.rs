/// Error type for this crate.
///
/// Construction errors are returned directly. A run can only fail with
/// [`PacelineError::PacerStopped`], which reaches the caller through the work
/// unit's own error type via `From<PacelineError>`. Errors produced by the work
/// unit are returned as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacelineError {
    /// Resolution is zero while the rate is positive.
    #[error("invalid resolution: {0}")]
    InvalidResolution(String),

    /// `resolution / rate` truncates to a zero-length pacing interval.
    #[error("invalid pacing interval: {0}")]
    InvalidInterval(String),

    /// No async runtime is available to host the pacing task.
    #[error("runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// The pacing task stopped, usually because the runtime it was spawned on shut down.
    #[error("pacer stopped: {0}")]
    PacerStopped(String),
}
