//! Tracing and logging setup shared by binaries embedding forgecmd.

pub mod config;
pub mod tracing;

pub use config::{LogConfig, LogFormat};

/// Initialize process-wide logging from the environment.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init_with(&LogConfig::from_env());
}
