//! Fetcher for plugins whose source locator is a local package file.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::{FetchError, PluginFetcher, ProgressReporter, temp_path, transfer_percent};
use crate::discovery::AvailablePlugin;
use crate::{Error, Result};

const CHUNK_SIZE: usize = 64 * 1024;

/// Copies a package file from the local filesystem in chunks, observing
/// cancellation between chunks like a remote transfer would.
pub struct LocalPluginFetcher;

impl LocalPluginFetcher {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LocalPluginFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginFetcher for LocalPluginFetcher {
    fn name(&self) -> &str {
        "local-file"
    }

    fn supports(&self, plugin: &AvailablePlugin) -> bool {
        Path::new(plugin.source.locator()).is_file()
    }

    async fn fetch(
        &self,
        plugin: &AvailablePlugin,
        destination: &Path,
        token: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<()> {
        let source_path = Path::new(plugin.source.locator());
        let temp = temp_path(destination);

        let result = copy_chunked(source_path, &temp, token, progress).await;
        match result {
            Ok(()) => {
                tokio::fs::rename(&temp, destination)
                    .await
                    .map_err(|e| FetchError::fetch(plugin, e))?;
                progress.report(100);
                Ok(())
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp).await;
                match e {
                    CopyFailure::Cancelled => Err(Error::Cancelled),
                    CopyFailure::Io(io) => Err(FetchError::fetch(plugin, io).into()),
                }
            }
        }
    }
}

enum CopyFailure {
    Cancelled,
    Io(std::io::Error),
}

impl From<std::io::Error> for CopyFailure {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

async fn copy_chunked(
    source: &Path,
    temp: &Path,
    token: &CancellationToken,
    progress: &ProgressReporter,
) -> Result<(), CopyFailure> {
    let mut reader = File::open(source).await?;
    let total = reader.metadata().await?.len();
    let mut writer = File::create(temp).await?;

    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut copied: u64 = 0;
    loop {
        if token.is_cancelled() {
            return Err(CopyFailure::Cancelled);
        }
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        copied += n as u64;
        if total > 0 {
            progress.report(transfer_percent(copied, total));
        }
    }
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::PluginSource;
    use crate::identity::PluginIdentity;
    use tempfile::tempdir;

    fn available(path: &Path) -> AvailablePlugin {
        AvailablePlugin {
            identity: PluginIdentity::new("local", "1.0.0".parse().unwrap()).unwrap(),
            display_name: "local".into(),
            description: String::new(),
            source: PluginSource::new(path.to_string_lossy()),
        }
    }

    #[tokio::test]
    async fn test_fetch_copies_bytes() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("pkg.ppkg");
        let payload = vec![7u8; 200_000]; // multiple chunks
        std::fs::write(&source, &payload).unwrap();

        let dest = dir.path().join("out/pkg.ppkg");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();

        let (progress, mut rx) = ProgressReporter::channel();
        let fetcher = LocalPluginFetcher::new();
        fetcher
            .fetch(
                &available(&source),
                &dest,
                &CancellationToken::new(),
                &progress,
            )
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), payload);
        assert!(!temp_path(&dest).exists());

        drop(progress);
        let mut last = 0;
        while let Some(p) = rx.recv().await {
            assert!(p >= last, "progress must not go backwards");
            last = p;
        }
        assert_eq!(last, 100);
    }

    #[tokio::test]
    async fn test_cancelled_fetch_leaves_nothing() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("pkg.ppkg");
        std::fs::write(&source, vec![1u8; 500_000]).unwrap();

        let dest = dir.path().join("pkg-dest.ppkg");
        let token = CancellationToken::new();
        token.cancel();

        let fetcher = LocalPluginFetcher::new();
        let err = fetcher
            .fetch(
                &available(&source),
                &dest,
                &token,
                &ProgressReporter::disabled(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert!(!dest.exists());
        assert!(!temp_path(&dest).exists());
    }

    #[tokio::test]
    async fn test_missing_source_is_fetch_error() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("pkg.ppkg");

        let fetcher = LocalPluginFetcher::new();
        let err = fetcher
            .fetch(
                &available(Path::new("/nonexistent/pkg.ppkg")),
                &dest,
                &CancellationToken::new(),
                &ProgressReporter::disabled(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Fetch(FetchError::Fetch { .. })));
        assert!(!dest.exists());
    }

    #[test]
    fn test_supports_only_existing_files() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("pkg.ppkg");
        std::fs::write(&file, b"x").unwrap();

        let fetcher = LocalPluginFetcher::new();
        assert!(fetcher.supports(&available(&file)));
        assert!(!fetcher.supports(&available(dir.path())));
        assert!(!fetcher.supports(&available(Path::new("https://example.com/p.ppkg"))));
    }
}
