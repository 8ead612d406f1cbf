//! MixCraft Logging
//!
//! `tracing` subscriber setup shared by binaries and tests.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Directives used when `RUST_LOG` is not set
pub const DEFAULT_DIRECTIVES: &str = "info,mixcraft=debug";

/// Install the global subscriber. `RUST_LOG` wins over `default_directives`.
///
/// Panics if a global subscriber is already set.
pub fn init_logging(default_directives: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Subscriber for tests; safe to call from every test
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
