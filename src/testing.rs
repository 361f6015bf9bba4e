//! Shared helpers for integration tests.

use std::sync::atomic::{AtomicU64, Ordering};

// Keeps run ids unique even when tests share a process.
static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Produce a run identifier that is unique across parallel test runs.
pub fn unique_test_run_id(prefix: &str) -> String {
    let counter = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{prefix}-{}-{counter}", uuid::Uuid::new_v4())
}

/// Install a tracing subscriber for tests that want log output.
///
/// Safe to call from every test; only the first call installs one.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
