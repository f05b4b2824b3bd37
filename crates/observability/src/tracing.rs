//! Subscriber installation.

use tracing_subscriber::EnvFilter;

use crate::config::{LogConfig, LogFormat};

/// Install a global fmt subscriber built from `config`.
///
/// Returns `false` when a global subscriber was already set; the existing one
/// stays in place.
pub fn init_with(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(config.with_target);

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    }
    .is_ok();
    if installed {
        ::tracing::debug!(filter = %config.filter, format = ?config.format, "logging initialised");
    }
    installed
}
