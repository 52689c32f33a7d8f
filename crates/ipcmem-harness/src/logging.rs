//! Subscriber setup for the harness binary.

use tracing_subscriber::{EnvFilter, fmt};

/// Install a compact `fmt` subscriber filtered by `RUST_LOG`.
///
/// Defaults to `warn` so engine debug events stay quiet unless asked for.
/// Calling this twice is harmless.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init()
        .ok();
}
