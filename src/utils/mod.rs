use anyhow::{Context, Result};
use std::path::Path;

/// Splits a yt-dlp option string the way a POSIX shell would.
pub fn split_options(options: &str) -> Result<Vec<String>> {
    shlex::split(options).with_context(|| format!("Unbalanced quoting in options: {}", options))
}

/// Creates the output directory (and parents) unless it already exists.
pub fn prepare_output_dir(path: &Path) -> Result<()> {
    if path.exists() && !path.is_dir() {
        anyhow::bail!("{} is not a directory", path.display());
    }
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create output directory {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_options() -> Result<()> {
        assert_eq!(
            split_options("-x --audio-format mp3 -o '%(title)s.%(ext)s'")?,
            ["-x", "--audio-format", "mp3", "-o", "%(title)s.%(ext)s"]
        );
        assert!(split_options("")?.is_empty());
        assert!(split_options("--format \"best").is_err());
        Ok(())
    }

    #[test]
    fn test_prepare_output_dir() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let nested = dir.path().join("a").join("b");
        prepare_output_dir(&nested)?;
        assert!(nested.is_dir());
        prepare_output_dir(&nested)?;

        let file = dir.path().join("file");
        std::fs::write(&file, b"x")?;
        assert!(prepare_output_dir(&file).is_err());
        Ok(())
    }
}
