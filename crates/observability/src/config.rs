//! Logging configuration read from the environment.

use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown log format `{0}` (expected `json` or `pretty`)")]
pub struct UnknownLogFormat(pub String);

impl FromStr for LogFormat {
    type Err = UnknownLogFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(UnknownLogFormat(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directives, e.g. `info,forgecmd=debug`.
    pub filter: String,
    pub format: LogFormat,
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Json,
            with_target: false,
        }
    }
}

impl LogConfig {
    /// Defaults overridden by `RUST_LOG` and `FORGECMD_LOG_FORMAT`.
    /// An unrecognised format falls back to JSON.
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("RUST_LOG").ok(),
            std::env::var("FORGECMD_LOG_FORMAT").ok(),
        )
    }

    fn from_vars(filter: Option<String>, format: Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(filter) = filter.filter(|f| !f.trim().is_empty()) {
            config.filter = filter;
        }
        if let Some(format) = format.and_then(|f| f.parse().ok()) {
            config.format = format;
        }
        config
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_json_at_info() {
        let config = LogConfig::from_vars(None, None);
        assert_eq!(config, LogConfig::default());
        assert_eq!(config.filter, "info");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn reads_filter_and_format() {
        let config = LogConfig::from_vars(Some("forgecmd=debug".into()), Some("Pretty".into()));
        assert_eq!(config.filter, "forgecmd=debug");
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn ignores_blank_filter_and_unknown_format() {
        let config = LogConfig::from_vars(Some("  ".into()), Some("xml".into()));
        assert_eq!(config, LogConfig::default());
        assert_eq!("xml".parse::<LogFormat>(), Err(UnknownLogFormat("xml".into())));
    }

    #[test]
    fn builders_override_fields() {
        let config = LogConfig::default()
            .with_filter("warn")
            .with_format(LogFormat::Pretty)
            .with_target(true);
        assert_eq!(config.filter, "warn");
        assert_eq!(config.format, LogFormat::Pretty);
        assert!(config.with_target);
    }
}
