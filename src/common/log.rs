//! Structured logging to stderr, the stream AMPL shows to the modeller.

use tracing_subscriber::{fmt, EnvFilter};

use super::config::DEFAULT_LOG_FILTER;

/// Install the global subscriber. Later calls, or a subscriber installed by the host
/// process, win silently.
pub fn init(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Initialize tracing for tests; honours `RUST_LOG`, defaults to debug.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}
