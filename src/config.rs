//! Per-invocation configuration.
//!
//! [`CliConfig`] is resolved once in `main` from the global flags and the
//! environment, then handed to each command by value.

/// Environment variable selecting the log level (`debug`, `info`, anything else is silent).
pub const LOG_ENV: &str = "KROCTL_LOG";

/// Presence of this variable disables coloured output.
pub const NO_COLOR_ENV: &str = "NO_COLOR";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewType {
    Human,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Silent,
    Info,
    Debug,
}

impl LogLevel {
    fn from_env_value(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            _ => LogLevel::Silent,
        }
    }

    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Silent => log::LevelFilter::Off,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CliConfig {
    pub view: ViewType,
    pub log_level: LogLevel,
    pub color: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            view: ViewType::Human,
            log_level: LogLevel::Silent,
            color: true,
        }
    }
}

impl CliConfig {
    /// Resolves the configuration from the global flags and an environment lookup.
    ///
    /// `--debug` always wins over `KROCTL_LOG`.
    pub fn resolve<F>(json: bool, debug: bool, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let view = if json { ViewType::Json } else { ViewType::Human };

        let log_level = if debug {
            LogLevel::Debug
        } else {
            lookup(LOG_ENV)
                .map(|value| LogLevel::from_env_value(&value))
                .unwrap_or(LogLevel::Silent)
        };

        let color = lookup(NO_COLOR_ENV).is_none();

        Self {
            view,
            log_level,
            color,
        }
    }

    /// Same as [`CliConfig::resolve`] against the process environment.
    pub fn from_env(json: bool, debug: bool) -> Self {
        Self::resolve(json, debug, |key| std::env::var(key).ok())
    }
}
