//! Tracing initialization.
//!
//! Installs a `tracing-subscriber` fmt subscriber filtered by `RUST_LOG`
//! (defaulting to `info`). Host applications that bring their own subscriber
//! can skip this entirely; the core only ever emits through the `tracing`
//! macros.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize console tracing for the process.
///
/// Fails if a global subscriber is already installed.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}
