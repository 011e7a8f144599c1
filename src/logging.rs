//! Tracing/logging initialization for the binary.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `escrow_ledger=debug`.
pub const LOG_ENV: &str = "ESCROW_LEDGER_LOG";

/// Install the process-wide fmt subscriber, writing to stderr so command
/// output on stdout stays machine readable.
///
/// `ESCROW_LEDGER_LOG` wins when set; otherwise the level is `info`, or
/// `debug` when `verbose` is true. Safe to call multiple times.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
