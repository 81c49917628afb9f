pub mod downloader;
pub mod spreadsheet;
pub mod sync;

pub use downloader::{DownloadError, DownloaderEngine, MediaDownloader, YtDlp};
pub use spreadsheet::{Source, SpreadsheetError, SpreadsheetFormat, Table};
pub use sync::{RowStatus, SyncError, SyncOptions, SyncReport};
