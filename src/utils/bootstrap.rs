//! Bootstrap utilities for processes embedding the stream library.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Initialize tracing with the TABLESTREAM_LOG environment variable.
///
/// Defaults to "info" level if TABLESTREAM_LOG is not set. Returns `false`
/// when a global subscriber was already installed, so tests may call it
/// repeatedly.
pub fn init_tracing() -> bool {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init()
        .is_ok()
}
