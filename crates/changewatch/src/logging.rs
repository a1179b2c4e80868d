//! Tracing setup for test binaries.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install a global subscriber writing through the test harness's captured
/// output.
///
/// Defaults to INFO, can be overridden with `RUST_LOG`.
/// Returns false when a global subscriber was already installed, so calling it
/// from every test is fine.
pub fn init_logging() -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_test_writer())
        .try_init()
        .is_ok()
}
