//! Shared helpers for penpal integration tests.

#![allow(dead_code)]

use std::future::Future;

use tokio::task::LocalSet;

/// Install a test-writer subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Run `future` inside a `LocalSet` so bus deliveries and timers can spawn.
pub async fn run_local<F: Future>(future: F) -> F::Output {
    LocalSet::new().run_until(future).await
}

/// Let every queued bus delivery run.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
