//! Tracing subscriber bootstrap
//!
//! The library itself only emits `tracing` events. Binaries and tests that
//! want to see them install a fmt subscriber here. `RUST_LOG` takes precedence
//! over the default filter passed in.

use tracing_subscriber::EnvFilter;

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install a global fmt subscriber. Panics if one is already installed.
pub fn init(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_filter))
        .init();
}

/// Install a global fmt subscriber unless one is already installed.
///
/// Output goes through the test writer so `cargo test` captures it.
/// Returns `false` if another subscriber was already in place.
pub fn try_init(default_filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_filter))
        .with_test_writer()
        .try_init()
        .is_ok()
}
