//! Fetching plugin package bytes.
//!
//! A [`PluginFetcher`] declares support for an [`AvailablePlugin`] and
//! streams its package to a destination path. Fetchers never leave a
//! partial file at the destination: bytes go to a sibling temp path that is
//! atomically renamed on success and deleted on cancellation or failure.
//! Cancellation is checked at least once per chunk.

mod http;
mod local;

pub use http::HttpPluginFetcher;
pub use local::LocalPluginFetcher;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::discovery::AvailablePlugin;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// No configured fetcher declared support for the plugin's source.
    #[error("no configured fetcher supports plugin {plugin}")]
    NoSupportingFetcher { plugin: Box<AvailablePlugin> },

    /// The transfer itself failed. Retryable depending on the inner cause.
    #[error("failed to fetch plugin {plugin}")]
    Fetch {
        plugin: Box<AvailablePlugin>,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl FetchError {
    pub(crate) fn fetch(
        plugin: &AvailablePlugin,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Fetch {
            plugin: Box::new(plugin.clone()),
            source: Box::new(source),
        }
    }
}

/// Integer-percentage progress channel for one transfer.
///
/// Repeated reports of the same percentage are collapsed; a closed or
/// absent receiver never fails the transfer.
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<u8>>,
    last: AtomicU8,
}

impl ProgressReporter {
    /// A reporter wired to a channel the caller can observe.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<u8>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Some(tx),
                last: AtomicU8::new(u8::MAX),
            },
            rx,
        )
    }

    /// A reporter that discards all reports.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            last: AtomicU8::new(u8::MAX),
        }
    }

    pub fn report(&self, percent: u8) {
        let percent = percent.min(100);
        if self.last.swap(percent, Ordering::Relaxed) == percent {
            return;
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(percent);
        }
    }
}

/// Streams one plugin package to a local file.
#[async_trait]
pub trait PluginFetcher: Send + Sync {
    /// Fetcher name for ordering and debugging.
    fn name(&self) -> &str;

    /// Whether this fetcher can retrieve the plugin's source locator.
    fn supports(&self, plugin: &AvailablePlugin) -> bool;

    /// Stream the package bytes to `destination`.
    ///
    /// On success the complete file exists at `destination`; on
    /// cancellation or failure nothing is left there.
    async fn fetch(
        &self,
        plugin: &AvailablePlugin,
        destination: &Path,
        token: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<()>;
}

/// Integer percentage of a transfer, clamped before the narrowing cast so
/// a stream that delivers more bytes than its declared total can never
/// wrap and make progress regress.
pub(crate) fn transfer_percent(transferred: u64, total: u64) -> u8 {
    (transferred.saturating_mul(100) / total).min(100) as u8
}

/// Sibling temp path used while a transfer is in flight.
pub(crate) fn temp_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path_is_a_sibling() {
        let temp = temp_path(Path::new("/downloads/pkg.ppkg"));
        assert_eq!(temp, Path::new("/downloads/pkg.ppkg.part"));
    }

    #[tokio::test]
    async fn test_progress_collapses_duplicates() {
        let (reporter, mut rx) = ProgressReporter::channel();
        reporter.report(10);
        reporter.report(10);
        reporter.report(50);
        reporter.report(250); // clamped to 100
        drop(reporter);

        let mut seen = Vec::new();
        while let Some(p) = rx.recv().await {
            seen.push(p);
        }
        assert_eq!(seen, vec![10, 50, 100]);
    }

    #[test]
    fn test_transfer_percent_clamps_overrun() {
        assert_eq!(transfer_percent(50, 200), 25);
        assert_eq!(transfer_percent(200, 200), 100);
        // More bytes than the declared total must not wrap past 100.
        assert_eq!(transfer_percent(300, 100), 100);
        assert_eq!(transfer_percent(u64::MAX, 100), 100);
    }

    #[test]
    fn test_disabled_reporter_is_inert() {
        let reporter = ProgressReporter::disabled();
        reporter.report(42);
        reporter.report(100);
    }
}
