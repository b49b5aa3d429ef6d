//! Tracing subscriber setup.
//!
//! The library itself only emits `tracing` spans/events and `log`
//! records; embedding applications call [`init`] once at startup.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs a global fmt subscriber with `RUST_LOG`-style filtering and
/// bridges `log` records into `tracing`.
///
/// Returns quietly if a subscriber is already installed, so tests can
/// call it repeatedly.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_log::LogTracer::init();
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
