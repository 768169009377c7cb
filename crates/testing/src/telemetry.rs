//! Tracing setup for tests.

use tracing_subscriber::EnvFilter;

/// Initialize a tracing subscriber for the current test binary.
///
/// Honors `RUST_LOG` when set and defaults to `info` otherwise. Output
/// goes through the test writer so it is captured per test. Safe to call
/// from every test; only the first call in a process installs the
/// subscriber.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
