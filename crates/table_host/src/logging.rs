//! Logging system setup
//!
//! Installs the global `tracing` subscriber. Output is filtered by `RUST_LOG`
//! when set, falling back to the configured level, and carries thread names
//! so each bot and seat thread can be told apart.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingSettings;

/// Builds the level filter, preferring `RUST_LOG` over the configured level.
fn build_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level))
}

/// Initialize the logging system.
///
/// Fails if a global subscriber has already been installed.
pub fn setup_logging(settings: &LoggingSettings) -> Result<()> {
    let registry = tracing_subscriber::registry().with(build_filter(settings));

    if settings.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    }

    info!("Logging initialized with level: {}", settings.level);
    Ok(())
}
