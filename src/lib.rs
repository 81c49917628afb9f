pub mod cli;
pub mod config;
pub mod core;
pub mod logging;
pub mod utils;

pub use crate::core::{DownloaderEngine, MediaDownloader, RowStatus, Source, SpreadsheetFormat, Table};
pub use crate::logging::{LevelError, LevelSetting, LogLevelResolver};
