//! Fetcher for plugins served over HTTP(S).

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use super::{FetchError, PluginFetcher, ProgressReporter, temp_path, transfer_percent};
use crate::credentials::{Credential, CredentialService};
use crate::discovery::AvailablePlugin;
use crate::{Error, Result};

/// Streams a package over HTTP(S) with `reqwest`.
///
/// When a [`CredentialService`] is attached, its credential (if any) is
/// applied to the request. Progress percentages come from the
/// `Content-Length` header; without one, only the final 100 is reported.
pub struct HttpPluginFetcher {
    client: reqwest::Client,
    credentials: Option<Arc<CredentialService>>,
}

impl HttpPluginFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Arc<CredentialService>) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

impl Default for HttpPluginFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginFetcher for HttpPluginFetcher {
    fn name(&self) -> &str {
        "http"
    }

    fn supports(&self, plugin: &AvailablePlugin) -> bool {
        let locator = plugin.source.locator();
        locator.starts_with("http://") || locator.starts_with("https://")
    }

    async fn fetch(
        &self,
        plugin: &AvailablePlugin,
        destination: &Path,
        token: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<()> {
        let mut request = self.client.get(plugin.source.locator());
        if let Some(service) = &self.credentials {
            match service.get_credentials(&plugin.source, token).await? {
                Some(Credential::Bearer(bearer)) => request = request.bearer_auth(bearer),
                Some(Credential::Basic { username, password }) => {
                    request = request.basic_auth(username, Some(password));
                }
                None => {}
            }
        }

        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| FetchError::fetch(plugin, e))?;
        let total = response.content_length().unwrap_or(0);

        let temp = temp_path(destination);
        let result = write_stream(response, &temp, total, token, progress).await;
        match result {
            Ok(()) => {
                tokio::fs::rename(&temp, destination)
                    .await
                    .map_err(|e| FetchError::fetch(plugin, e))?;
                progress.report(100);
                tracing::debug!(plugin = %plugin.identity, "package downloaded");
                Ok(())
            }
            Err(StreamFailure::Cancelled) => {
                let _ = tokio::fs::remove_file(&temp).await;
                Err(Error::Cancelled)
            }
            Err(StreamFailure::Io(e)) => {
                let _ = tokio::fs::remove_file(&temp).await;
                Err(FetchError::fetch(plugin, e).into())
            }
            Err(StreamFailure::Transport(e)) => {
                let _ = tokio::fs::remove_file(&temp).await;
                Err(FetchError::fetch(plugin, e).into())
            }
        }
    }
}

enum StreamFailure {
    Cancelled,
    Io(std::io::Error),
    Transport(reqwest::Error),
}

async fn write_stream(
    response: reqwest::Response,
    temp: &Path,
    total: u64,
    token: &CancellationToken,
    progress: &ProgressReporter,
) -> Result<(), StreamFailure> {
    let mut writer = File::create(temp).await.map_err(StreamFailure::Io)?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        if token.is_cancelled() {
            return Err(StreamFailure::Cancelled);
        }
        let chunk: bytes::Bytes = chunk.map_err(StreamFailure::Transport)?;
        writer
            .write_all(&chunk)
            .await
            .map_err(StreamFailure::Io)?;
        downloaded += chunk.len() as u64;
        if total > 0 {
            progress.report(transfer_percent(downloaded, total));
        }
    }
    writer.flush().await.map_err(StreamFailure::Io)?;
    Ok(())
}
