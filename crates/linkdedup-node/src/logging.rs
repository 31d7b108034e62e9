//! Tracing subscriber setup.
//!
//! Log levels follow these conventions:
//! - ERROR: sequences outside both windows, missed announcements
//! - WARN: announce delivery failures, exhausted conflict retries
//! - INFO: link initialization and window advances
//! - DEBUG: announce delivery, compare-and-set conflicts, partition truncation
//! - TRACE: per-message dedup decisions and persisted states

use tracing_subscriber::EnvFilter;

/// Build the filter from `RUST_LOG`, falling back to `default_level`.
fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize human-readable logging.
pub fn init(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(default_level))
        .init();
}

/// Initialize JSON logging, selected with `RUST_LOG_FORMAT=json`.
pub fn init_json(default_level: &str) {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter(default_level))
        .init();
}

/// Initialize logging for tests. Safe to call more than once.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("debug"))
        .with_test_writer()
        .try_init();
}
