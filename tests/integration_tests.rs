use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use url::Url;

use local_playlist_syncer::core::downloader::Result as DownloadResult;
use local_playlist_syncer::core::spreadsheet;
use local_playlist_syncer::core::sync::{sync, SyncOptions};
use local_playlist_syncer::core::{
    DownloadError, DownloaderEngine, MediaDownloader, RowStatus, Source, YtDlp,
};
use local_playlist_syncer::{LogLevelResolver, SpreadsheetFormat};

/// Records what it was asked to fetch and writes a marker file.
struct FakeDownloader {
    name: &'static str,
    host: &'static str,
    calls: Arc<Mutex<Vec<(String, PathBuf)>>>,
}

#[async_trait]
impl MediaDownloader for FakeDownloader {
    fn name(&self) -> &'static str {
        self.name
    }

    fn suitable(&self, url: &Url) -> bool {
        url.host_str() == Some(self.host)
    }

    async fn download(&self, url: &Url, output_dir: &Path) -> DownloadResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), output_dir.to_path_buf()));
        if url.path().contains("missing") {
            return Err(DownloadError::Failed {
                program: self.name.to_string(),
                code: "code 1".to_string(),
                stderr: "HTTP Error 404: Not Found".to_string(),
            });
        }
        tokio::fs::write(output_dir.join(url.path().trim_start_matches('/')), b"media").await?;
        Ok(())
    }
}

fn fake(
    name: &'static str,
    host: &'static str,
) -> (Box<FakeDownloader>, Arc<Mutex<Vec<(String, PathBuf)>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let downloader = FakeDownloader {
        name,
        host,
        calls: calls.clone(),
    };
    (Box::new(downloader), calls)
}

#[tokio::test]
async fn test_engine_picks_first_suitable_downloader() -> Result<()> {
    let output = tempfile::tempdir()?;
    let (cdn, cdn_calls) = fake("cdn", "cdn.example.com");
    let (video, video_calls) = fake("video", "video.example.com");

    let mut engine = DownloaderEngine::new();
    engine.register_downloader(cdn);
    engine.register_downloader(video);
    assert_eq!(engine.downloaders.len(), 2);

    let backend = engine
        .download("https://video.example.com/clip", output.path())
        .await?;
    assert_eq!(backend, "video");
    assert!(cdn_calls.lock().unwrap().is_empty());
    assert_eq!(video_calls.lock().unwrap().len(), 1);

    let err = engine
        .download("https://elsewhere.example.com/x", output.path())
        .await
        .unwrap_err();
    assert!(matches!(err, DownloadError::NoDownloader(_)));

    let err = engine.download("not a link", output.path()).await.unwrap_err();
    assert!(matches!(err, DownloadError::InvalidLink { .. }));
    Ok(())
}

#[tokio::test]
async fn test_csv_to_status_report() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let csv_path = dir.path().join("playlist.csv");
    std::fs::write(
        &csv_path,
        "title,webpage_url\n\
         First,https://video.example.com/first.mp4\n\
         Gone,https://video.example.com/missing\n\
         Blank,\n\
         Last,https://video.example.com/last.mp4\n",
    )?;
    let output = dir.path().join("media");
    std::fs::create_dir_all(&output)?;

    let (source, format) = Source::detect(csv_path.to_str().unwrap(), &[], None)?;
    let table = spreadsheet::read(&source, format)?;

    let (video, calls) = fake("video", "video.example.com");
    let mut engine = DownloaderEngine::new();
    engine.register_downloader(video);

    let options = SyncOptions {
        output: output.clone(),
        ..Default::default()
    };
    let report = sync(table, &engine, &options).await?;

    assert_eq!(
        report.statuses,
        [
            RowStatus::Downloaded { backend: "video" },
            RowStatus::Failed("video exited with code 1: HTTP Error 404: Not Found".to_string()),
            RowStatus::Skipped("no link".to_string()),
            RowStatus::Downloaded { backend: "video" },
        ]
    );
    assert!(output.join("first.mp4").is_file());
    assert!(output.join("last.mp4").is_file());
    assert!(calls.lock().unwrap().iter().all(|(_, dir)| dir == &output));

    let mut csv = Vec::new();
    report.table.write_csv(&mut csv)?;
    let csv = String::from_utf8(csv)?;
    assert!(csv.starts_with("title,webpage_url,status\n"));
    assert!(csv.contains("Blank,,skipped: no link\n"));
    Ok(())
}

#[tokio::test]
async fn test_abort_on_error_leaves_later_rows_untouched() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let data = r#"[{"url": "https://video.example.com/missing"}, {"url": "https://video.example.com/next.mp4"}]"#;
    let table = spreadsheet::read_from(data.as_bytes(), SpreadsheetFormat::Json)?;

    let (video, calls) = fake("video", "video.example.com");
    let mut engine = DownloaderEngine::new();
    engine.register_downloader(video);

    let options = SyncOptions {
        output: dir.path().to_path_buf(),
        abort_on_error: true,
        ..Default::default()
    };
    let report = sync(table, &engine, &options).await?;

    assert!(report.aborted);
    assert_eq!(report.failures(), 1);
    assert_eq!(report.statuses[1], RowStatus::NotProcessed);
    assert_eq!(calls.lock().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_yt_dlp_arguments() -> Result<()> {
    let yt_dlp = YtDlp::new("yt-dlp", vec!["-x".to_string(), "--audio-format".to_string(), "mp3".to_string()]);
    let url = Url::parse("https://www.youtube.com/watch?v=dQw4w9WgXcQ")?;

    assert!(yt_dlp.suitable(&url));
    assert!(!yt_dlp.suitable(&Url::parse("file:///etc/passwd")?));

    let args = yt_dlp.command_args(&url, Path::new("media"));
    let args: Vec<&str> = args.iter().filter_map(|a| a.to_str()).collect();
    assert_eq!(
        args,
        [
            "-x",
            "--audio-format",
            "mp3",
            "--paths",
            "media",
            "--",
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_missing_yt_dlp_program_is_reported() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let yt_dlp = YtDlp::new("definitely-not-an-installed-program", Vec::new());
    let url = Url::parse("https://video.example.com/clip")?;

    let err = yt_dlp.download(&url, dir.path()).await.unwrap_err();
    assert!(matches!(err, DownloadError::Spawn { .. }));
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn test_yt_dlp_failure_carries_exit_code_and_stderr() -> Result<()> {
    let dir = tempfile::tempdir()?;
    // `sh -c` takes the trailing `--paths DIR -- URL` as positional parameters
    let yt_dlp = YtDlp::new(
        "sh",
        vec![
            "-c".to_string(),
            "echo first >&2; echo; echo boom >&2; exit 3".to_string(),
        ],
    );
    let url = Url::parse("https://video.example.com/clip")?;

    let err = yt_dlp.download(&url, dir.path()).await.unwrap_err();
    match &err {
        DownloadError::Failed {
            program,
            code,
            stderr,
        } => {
            assert_eq!(program, "sh");
            assert_eq!(code, "code 3");
            assert_eq!(stderr, "first / boom");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.to_string(), "sh exited with code 3: first / boom");
    Ok(())
}

#[test]
fn test_level_resolution_through_public_api() {
    let resolver = LogLevelResolver::standard();

    for flag in resolver.flags() {
        assert_eq!(resolver.resolve(flag.name.to_lowercase().as_str()), Ok(flag.value));
        assert_eq!(resolver.resolve(flag.prefix.as_str()), Ok(flag.value));
    }
    assert_eq!(resolver.resolve(42), Ok(42));
    assert!(resolver.resolve("xyz").is_err());
}
