//! Telemetry helpers for structured logging and tracing.

use tracing_subscriber::EnvFilter;

/// Install a default fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"info"` or `"prometheus_schedules=debug"`).
///
/// Does nothing if a global subscriber is already installed, so
/// applications can install their own first.
pub fn init_tracing(default_directive: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}
