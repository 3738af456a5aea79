//! Diagnostics for the `snowmill` binary.
//!
//! Logs are written to stderr so that stdout only ever carries IDs. Filtering
//! follows `RUST_LOG` and defaults to `warn`, which keeps normal runs silent
//! apart from clock drift warnings.

use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global `tracing` subscriber.
pub fn init_tracing() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();
}
