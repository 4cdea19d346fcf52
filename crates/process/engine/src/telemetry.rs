//! Tracing subscriber setup
//!
//! Components only emit `tracing` events; installing the subscriber is left
//! to the host application.

use crate::config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global subscriber. `RUST_LOG` takes precedence over the
/// configured level. Fails if a subscriber is already installed.
pub fn init_tracing(
    config: &LoggingConfig,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = build_filter(config);

    if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
    }
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
