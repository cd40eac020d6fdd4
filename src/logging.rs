//! Structured logging setup.
//!
//! Embedders call `init_logging()` once at startup. Filtering follows
//! `RUST_LOG` with a `betalert=info` default; `BETALERT_LOG_JSON`
//! switches to JSON output for log shippers.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the `tracing` subscriber.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("betalert=info"));

    let json_logging = std::env::var("BETALERT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
