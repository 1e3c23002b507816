//! `tracing-subscriber` initialisation.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Builds the filter: `RUST_LOG` when set, the configured level otherwise.
#[must_use]
pub fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs a global subscriber.
///
/// Returns `false` if a subscriber was already installed; calling this
/// more than once is harmless.
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let filter = build_env_filter(config);
    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json {
        registry
            .with(fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry.with(fmt::layer().compact().with_target(true)).try_init()
    };

    result.is_ok()
}
