use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::core::downloader::DownloaderEngine;
use crate::core::spreadsheet::Table;

/// Columns that commonly hold the media link, in order of preference.
pub const LINK_COLUMNS: &[&str] = &["webpage_url", "original_url", "url", "link", "href"];

pub const STATUS_COLUMN: &str = "status";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("column {0:?} not found in spreadsheet")]
    MissingColumn(String),
    #[error("no link column found (looked for {})", LINK_COLUMNS.join(", "))]
    NoLinkColumn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowStatus {
    Downloaded { backend: &'static str },
    Skipped(String),
    Failed(String),
    NotProcessed,
}

impl RowStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, RowStatus::Failed(_))
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowStatus::Downloaded { backend } => write!(f, "ok ({})", backend),
            RowStatus::Skipped(reason) => write!(f, "skipped: {}", reason),
            RowStatus::Failed(message) => write!(f, "error: {}", message),
            RowStatus::NotProcessed => f.write_str("not processed"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    pub output: PathBuf,
    pub link_column: Option<String>,
    pub abort_on_error: bool,
    pub just_one: bool,
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    /// Input rows with the status column filled in.
    pub table: Table,
    pub statuses: Vec<RowStatus>,
    pub aborted: bool,
}

impl SyncReport {
    pub fn count(&self, predicate: impl Fn(&RowStatus) -> bool) -> usize {
        self.statuses.iter().filter(|s| predicate(*s)).count()
    }

    pub fn failures(&self) -> usize {
        self.count(RowStatus::is_failure)
    }
}

/// Picks the column holding media links.
pub fn find_link_column(table: &Table, requested: Option<&str>) -> Result<usize, SyncError> {
    if let Some(name) = requested {
        return table
            .column_index(name)
            .ok_or_else(|| SyncError::MissingColumn(name.to_string()));
    }

    LINK_COLUMNS
        .iter()
        .find_map(|candidate| {
            table
                .columns
                .iter()
                .position(|column| column.trim().eq_ignore_ascii_case(candidate))
        })
        .ok_or(SyncError::NoLinkColumn)
}

/// Downloads every row's link, one row at a time.
pub async fn sync(
    mut table: Table,
    engine: &DownloaderEngine,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError> {
    let link_column = find_link_column(&table, options.link_column.as_deref())?;
    if options.just_one {
        table.truncate(1);
    }
    info!(
        "Syncing {} rows using column {:?}",
        table.len(),
        table.columns[link_column]
    );

    let mut statuses = Vec::with_capacity(table.len());
    let mut aborted = false;
    for (index, row) in table.rows.iter().enumerate() {
        if aborted {
            statuses.push(RowStatus::NotProcessed);
            continue;
        }

        let link = row.get(link_column).map(|l| l.trim()).unwrap_or_default();
        let status = if link.is_empty() {
            warn!("Row {}: no link, skipping", index);
            RowStatus::Skipped("no link".to_string())
        } else {
            match engine.download(link, &options.output).await {
                Ok(backend) => {
                    info!("Row {}: {} done", index, link);
                    RowStatus::Downloaded { backend }
                }
                Err(e) => {
                    error!("Row {}: {}: {}", index, link, e);
                    RowStatus::Failed(e.to_string())
                }
            }
        };

        if status.is_failure() && options.abort_on_error {
            warn!("Aborting after error on row {}", index);
            aborted = true;
        }
        statuses.push(status);
    }

    table.set_column(STATUS_COLUMN, statuses.iter().map(ToString::to_string));
    Ok(SyncReport {
        table,
        statuses,
        aborted,
    })
}
