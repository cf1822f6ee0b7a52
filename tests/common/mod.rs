// Shared helpers for the integration tests.

#![allow(dead_code)]

use hyperflow::prelude::*;
use tracing_subscriber::EnvFilter;

/// Installs a test subscriber honoring `RUST_LOG`. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Waits until the observer holds a response and its queue drained.
pub async fn settled(observer: &FetchObserver) -> RequestState {
    let mut rx = observer.watch();
    let state = rx
        .wait_for(|state| state.timestamp.is_some() && !state.is_loading)
        .await
        .expect("observer alive")
        .clone();
    state
}

/// Waits until the observer state satisfies `predicate`.
pub async fn state_where(
    observer: &FetchObserver,
    predicate: impl FnMut(&RequestState) -> bool,
) -> RequestState {
    let mut rx = observer.watch();
    let state = rx.wait_for(predicate).await.expect("observer alive").clone();
    state
}
