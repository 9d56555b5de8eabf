//! Logging setup using `tracing-subscriber`.
//!
//! Dealwatch is a one-shot batch job, so there is no file layer or rotation:
//! a single human-readable layer on stderr, filtered by `RUST_LOG`
//! (default: `info`).

use tracing_subscriber::EnvFilter;

/// Initialise logging for a batch run.
///
/// Controlled by the `RUST_LOG` environment variable (default: `info`).
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
