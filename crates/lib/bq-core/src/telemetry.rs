//! Logging setup for the binaries.
//!
//! All log output goes to stderr so stdout stays free for command results
//! and, in the daemon, for the MCP protocol stream.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Initializes a stderr fmt subscriber filtered by `RUST_LOG`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_stderr_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}
