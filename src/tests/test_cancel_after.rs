use std::time::{Duration, Instant};

use crate::{CancellationToken, cancel_after};

use super::runtime::block_on;

#[test]
fn cancel_after_fires_once_elapsed() {
    block_on(async {
        let token = CancellationToken::new();
        cancel_after(&token, Duration::from_millis(20)).unwrap();

        assert!(!token.is_cancelled());

        let start = Instant::now();
        token.cancelled().await;

        assert!(token.is_cancelled());
        assert!(start.elapsed() >= Duration::from_millis(15));
    });
}

#[test]
fn cancel_after_reaches_child_tokens() {
    block_on(async {
        let parent = CancellationToken::new();
        let child = parent.child_token();

        cancel_after(&parent, Duration::from_millis(20)).unwrap();
        child.cancelled().await;

        assert!(parent.is_cancelled());
    });
}

#[test]
fn cancel_after_on_an_already_cancelled_token_is_harmless() {
    block_on(async {
        let token = CancellationToken::new();
        token.cancel();

        cancel_after(&token, Duration::from_millis(5)).unwrap();
        token.cancelled().await;

        assert!(token.is_cancelled());
    });
}

#[cfg(feature = "rt-tokio")]
#[test]
fn cancel_after_needs_a_runtime() {
    let token = CancellationToken::new();

    assert!(matches!(
        cancel_after(&token, Duration::from_millis(1)),
        Err(crate::PacelineError::RuntimeUnavailable(_))
    ));
}
