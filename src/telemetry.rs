//! Tracing setup for binaries built on the runtime.

use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Installs a global fmt subscriber filtered by `RUST_LOG`, falling back to
/// `default_directive` (e.g. `"info"`, `"stagehand=debug,info"`).
///
/// Safe to call multiple times; only the first call has an effect. Does nothing when
/// another global subscriber is already installed.
///
/// ```rust
/// stagehand::telemetry::init_tracing("info");
/// tracing::info!("ready");
/// ```
pub fn init_tracing(default_directive: &str) {
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_directive));

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true))
            .try_init();
    });
}
