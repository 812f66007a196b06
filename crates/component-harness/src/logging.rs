//! Tracing subscriber setup for test binaries.
//!
//! The library only emits `tracing` events; nothing is printed unless a
//! subscriber is installed. Both initializers honour `RUST_LOG` and fall back
//! to [`DEFAULT_FILTER`]. Installing twice is harmless, so every test may call
//! them.

use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "component_harness=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a human-readable subscriber writing through the test capture.
///
/// Returns `false` if a global subscriber was already set.
pub fn init_test_logging() -> bool {
    fmt()
        .with_env_filter(env_filter())
        .with_test_writer()
        .with_target(true)
        .try_init()
        .is_ok()
}

/// Install a JSON subscriber, one event per line.
///
/// Returns `false` if a global subscriber was already set.
pub fn init_json_logging() -> bool {
    fmt()
        .json()
        .with_env_filter(env_filter())
        .with_current_span(false)
        .try_init()
        .is_ok()
}
