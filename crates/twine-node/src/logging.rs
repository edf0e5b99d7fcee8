//! Tracing subscriber configuration for twine nodes.
//!
//! Level conventions across the workspace:
//! - ERROR: internal bugs (encode failures), unrecoverable setup errors
//! - WARN: recoverable errors, unexpected but handled conditions
//! - INFO: protocol events (router started, route learned)
//! - DEBUG: handler decisions, drops, cache sweeps
//! - TRACE: per-frame wire traffic

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with sensible defaults.
///
/// `RUST_LOG` overrides `default_filter`.
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Initialize the tracing subscriber with JSON output, for structured log
/// collection. Activated by `RUST_LOG_FORMAT=json`.
pub fn init_json(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .init();
}

/// Initialize for tests. Safe to call repeatedly.
pub fn init_for_tests() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
