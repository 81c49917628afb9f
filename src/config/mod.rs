use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::logging::{LevelError, LevelSetting, LogLevelResolver};

pub const APP_NAME: &str = "local-playlist-syncer";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_OUTPUT: &str = "media";
pub const DEFAULT_YT_DLP: &str = "yt-dlp";

/// A log level as written in a config file: `log-level = "debug"` or `log-level = 10`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LevelSpec {
    Value(i32),
    Name(String),
}

impl LevelSpec {
    pub fn resolve(&self, resolver: &LogLevelResolver) -> Result<i32, LevelError> {
        match self {
            LevelSpec::Value(value) => resolver.resolve(*value),
            LevelSpec::Name(name) => resolver.resolve(name),
        }
    }
}

/// Contents of a config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    pub output: Option<PathBuf>,
    pub format: Option<String>,
    pub abort_on_error: Option<bool>,
    pub just_one: Option<bool>,
    pub queries: Option<Vec<String>>,
    pub yt_dlp_options: Option<String>,
    pub log_level: Option<LevelSpec>,
    pub link_column: Option<String>,
    pub yt_dlp: Option<String>,
    pub report: Option<PathBuf>,
}

impl Config {
    /// Loads `explicit` if given, otherwise every default config file that exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let mut config = Self::default();
        for path in default_config_files() {
            if path.is_file() {
                config = config.merge(Self::from_file(&path)?);
            }
        }
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        tracing::debug!("Loaded config file {}", path.display());
        Ok(config)
    }

    /// Keys set in `other` win.
    pub fn merge(self, other: Config) -> Config {
        Config {
            output: other.output.or(self.output),
            format: other.format.or(self.format),
            abort_on_error: other.abort_on_error.or(self.abort_on_error),
            just_one: other.just_one.or(self.just_one),
            queries: other.queries.or(self.queries),
            yt_dlp_options: other.yt_dlp_options.or(self.yt_dlp_options),
            log_level: other.log_level.or(self.log_level),
            link_column: other.link_column.or(self.link_column),
            yt_dlp: other.yt_dlp.or(self.yt_dlp),
            report: other.report.or(self.report),
        }
    }
}

/// Candidate config files, lowest priority first.
pub fn default_config_files() -> Vec<PathBuf> {
    config_files_from(
        std::env::var("XDG_CONFIG_DIRS").ok(),
        std::env::var("XDG_CONFIG_HOME").ok(),
        dirs::home_dir(),
    )
}

fn config_files_from(
    config_dirs: Option<String>,
    config_home: Option<String>,
    home: Option<PathBuf>,
) -> Vec<PathBuf> {
    let mut search_dirs: Vec<PathBuf> = config_dirs
        .filter(|dirs| !dirs.is_empty())
        .unwrap_or_else(|| "/etc/xdg".to_string())
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .collect();

    match config_home.filter(|dir| !dir.is_empty()) {
        Some(dir) => search_dirs.push(PathBuf::from(dir)),
        None => {
            if let Some(home) = home {
                search_dirs.push(home.join(".config"));
            }
        }
    }

    search_dirs
        .into_iter()
        .map(|dir| dir.join(APP_NAME).join(CONFIG_FILE_NAME))
        .collect()
}

/// Everything a sync run needs, after merging the command line over the config file.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub spreadsheet: String,
    pub output: PathBuf,
    pub format: Option<String>,
    pub abort_on_error: bool,
    pub just_one: bool,
    pub queries: Vec<String>,
    pub yt_dlp_options: Vec<String>,
    pub yt_dlp: String,
    pub link_column: Option<String>,
    pub report: Option<PathBuf>,
    pub log_level: LevelSetting,
}
