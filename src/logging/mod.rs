pub mod resolver;

pub use resolver::{LevelError, LevelFlag, LevelInput, LogLevelResolver, DEFAULT_LEVEL};

use tracing_subscriber::filter::LevelFilter;

/// Environment variable that supplies the log level when no flag is given.
pub const LOG_LEVEL_ENV: &str = "LPS_LOG_LEVEL";

/// Effective logging configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelSetting {
    Level(i32),
    /// Logging disabled entirely.
    Quiet,
}

impl Default for LevelSetting {
    fn default() -> Self {
        LevelSetting::Level(DEFAULT_LEVEL)
    }
}

impl LevelSetting {
    /// Most verbose tracing level still shown for this threshold.
    pub fn filter(self) -> LevelFilter {
        match self {
            LevelSetting::Quiet => LevelFilter::OFF,
            LevelSetting::Level(value) if value <= 5 => LevelFilter::TRACE,
            LevelSetting::Level(value) if value <= 10 => LevelFilter::DEBUG,
            LevelSetting::Level(value) if value <= 20 => LevelFilter::INFO,
            LevelSetting::Level(value) if value <= 30 => LevelFilter::WARN,
            LevelSetting::Level(_) => LevelFilter::ERROR,
        }
    }
}

pub fn init(setting: LevelSetting) {
    if setting == LevelSetting::Quiet {
        return;
    }
    tracing_subscriber::fmt()
        .with_max_level(setting.filter())
        .with_writer(std::io::stderr)
        .init();
}
