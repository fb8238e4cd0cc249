//! Tracing setup for the binaries.
//!
//! ## Log Levels
//! - `RUST_LOG=debug` - everything at debug
//! - `RUST_LOG=laptoppos_db=trace` - trace for this crate only
//! - Otherwise the configured filter, [`DEFAULT_LOG_FILTER`] by default

use tracing_subscriber::EnvFilter;

pub const DEFAULT_LOG_FILTER: &str = "info,laptoppos=debug,sqlx=warn";

/// Installs the global fmt subscriber on stderr. `RUST_LOG` takes
/// precedence over `fallback`. Calling it twice is a no-op.
pub fn init_tracing(fallback: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
