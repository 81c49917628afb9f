use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid link {link:?}: {source}")]
    InvalidLink {
        link: String,
        source: url::ParseError,
    },
    #[error("no downloader accepts {0}")]
    NoDownloader(String),
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("{program} exited with {code}: {stderr}")]
    Failed {
        program: String,
        code: String,
        stderr: String,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DownloadError>;

/// A backend able to fetch a media link into a directory.
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    fn name(&self) -> &'static str;
    fn suitable(&self, url: &Url) -> bool;
    async fn download(&self, url: &Url, output_dir: &Path) -> Result<()>;
}

/// Hands each link to the first registered backend that accepts it.
pub struct DownloaderEngine {
    pub downloaders: Vec<Box<dyn MediaDownloader>>,
}

impl Default for DownloaderEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloaderEngine {
    pub fn new() -> Self {
        Self {
            downloaders: Vec::new(),
        }
    }

    pub fn register_downloader(&mut self, downloader: Box<dyn MediaDownloader>) {
        self.downloaders.push(downloader);
    }

    /// Returns the name of the backend that handled the link.
    pub async fn download(&self, link: &str, output_dir: &Path) -> Result<&'static str> {
        let url = Url::parse(link.trim()).map_err(|source| DownloadError::InvalidLink {
            link: link.to_string(),
            source,
        })?;

        for downloader in &self.downloaders {
            if downloader.suitable(&url) {
                debug!("{} handles {}", downloader.name(), url);
                downloader.download(&url, output_dir).await?;
                return Ok(downloader.name());
            }
        }

        Err(DownloadError::NoDownloader(url.to_string()))
    }
}

/// Delegates to the external `yt-dlp` program.
pub struct YtDlp {
    pub program: String,
    pub options: Vec<String>,
}

impl YtDlp {
    pub fn new(program: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            program: program.into(),
            options,
        }
    }

    pub fn command_args(&self, url: &Url, output_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.options.iter().map(OsString::from).collect();
        args.push("--paths".into());
        args.push(output_dir.as_os_str().to_owned());
        args.push("--".into());
        args.push(url.as_str().into());
        args
    }
}

#[async_trait]
impl MediaDownloader for YtDlp {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn suitable(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
    }

    async fn download(&self, url: &Url, output_dir: &Path) -> Result<()> {
        let args = self.command_args(url, output_dir);
        debug!("Running {} {:?}", self.program, args);

        let output = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| DownloadError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DownloadError::Failed {
                program: self.program.clone(),
                code: output
                    .status
                    .code()
                    .map_or_else(|| "a signal".to_string(), |c| format!("code {}", c)),
                stderr: stderr_tail(&stderr),
            });
        }

        info!("{} fetched {}", self.program, url);
        Ok(())
    }
}

fn stderr_tail(stderr: &str) -> String {
    const TAIL_LINES: usize = 3;
    let lines: Vec<&str> = stderr.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(TAIL_LINES)..].join(" / ")
}
