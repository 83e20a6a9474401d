use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use crate::PacelineError;

use super::runtime::async_sleep;

/// Error type for work units under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum WorkError {
    Failed(String),
    Limiter(PacelineError),
}

impl WorkError {
    pub(super) fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

impl From<PacelineError> for WorkError {
    fn from(err: PacelineError) -> Self {
        Self::Limiter(err)
    }
}

/// Counts invocations and how many of them run at the same time.
pub(super) struct Tracker {
    started: AtomicU64,
    finished: AtomicU64,
    in_flight: AtomicU64,
    max_in_flight: AtomicU64,
}

impl Tracker {
    pub(super) fn new() -> Arc<Self> {
        Arc::new(Self {
            started: AtomicU64::new(0),
            finished: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            max_in_flight: AtomicU64::new(0),
        })
    }

    pub(super) async fn run(
        &self,
        busy: Duration,
        result: Result<(), WorkError>,
    ) -> Result<(), WorkError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !busy.is_zero() {
            async_sleep(busy).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
        result
    }

    pub(super) fn started(&self) -> u64 {
        self.started.load(Ordering::SeqCst)
    }

    pub(super) fn finished(&self) -> u64 {
        self.finished.load(Ordering::SeqCst)
    }

    pub(super) fn max_in_flight(&self) -> u64 {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}
