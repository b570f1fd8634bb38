//! Logging and progress UI.
//!
//! [`Notifier`] wraps an `env_logger` logger and an `indicatif` spinner under
//! the single [`LogLevel`] switch from [`CliConfig`]:
//! - [`LogLevel::Silent`] → no text logs; in human mode on a terminal `info`
//!   messages drive a spinner on stderr instead.
//! - [`LogLevel::Info`]/[`LogLevel::Debug`] → plain log lines on stderr.
//!
//! The logger is owned by the notifier rather than installed globally, so any
//! number of notifiers can coexist (tests build one per case).

use crate::config::{CliConfig, LogLevel, ViewType};
use console::Term;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{Level, Log, Record};
use std::sync::OnceLock;
use std::time::Duration;

pub struct Notifier {
    logger: env_logger::Logger,
    spinner_enabled: bool,
    spinner: OnceLock<ProgressBar>,
}

impl Notifier {
    pub fn new(config: &CliConfig) -> Self {
        let logger = env_logger::Builder::new()
            .filter_level(config.log_level.to_level_filter())
            .target(env_logger::Target::Stderr)
            .build();

        let spinner_enabled = config.log_level == LogLevel::Silent
            && config.view == ViewType::Human
            && Term::stderr().is_term();

        Self {
            logger,
            spinner_enabled,
            spinner: OnceLock::new(),
        }
    }

    /// A notifier that never writes anything.
    pub fn silent() -> Self {
        Self {
            logger: env_logger::Builder::new()
                .filter_level(log::LevelFilter::Off)
                .build(),
            spinner_enabled: false,
            spinner: OnceLock::new(),
        }
    }

    pub fn info(&self, message: &str) {
        if self.spinner_enabled {
            let spinner = self.spinner.get_or_init(|| {
                let spinner = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
                if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}")
                {
                    spinner.set_style(style);
                }
                spinner.enable_steady_tick(Duration::from_millis(100));
                spinner
            });
            spinner.set_message(message.to_string());
            return;
        }
        self.emit(Level::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.emit(Level::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        self.emit(Level::Warn, message);
    }

    /// Clears the spinner, if any, so results print on a clean line.
    pub fn finish(&self) {
        if let Some(spinner) = self.spinner.get() {
            spinner.finish_and_clear();
        }
    }

    fn emit(&self, level: Level, message: &str) {
        self.logger.log(
            &Record::builder()
                .args(format_args!("{}", message))
                .level(level)
                .target("kroctl")
                .build(),
        );
    }
}
