//! Tracing subscriber setup for binaries and tests embedding the engine.

use tracing_subscriber::EnvFilter;

/// Install a formatted subscriber filtered at `level`.
///
/// `RUST_LOG` takes precedence when set; an unparsable level falls back to
/// `info`. Returns `false` if a global subscriber was already installed.
pub fn init_tracing(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
