//! Credential service: ordered provider chain with single-flight access.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{Credential, CredentialProvider};
use crate::discovery::PluginSource;
use crate::repository::ResourceRepository;
use crate::{Error, Result};

/// Resolves credentials by trying configured providers in order.
///
/// Providers live in a [`ResourceRepository`], so a chain shared with a
/// manager picks up hot-loaded providers on the next resolution. At most
/// one provider call is in flight at a time, across every source and every
/// caller of this service. Credential prompts are frequently interactive
/// and singleton, so the serialization is intentional. Cancellation is
/// observed between provider attempts only; a call already started runs to
/// completion.
pub struct CredentialService {
    providers: Arc<ResourceRepository<dyn CredentialProvider>>,
    // Single-flight gate over all provider calls.
    gate: Mutex<()>,
}

impl CredentialService {
    pub fn new(providers: Vec<Arc<dyn CredentialProvider>>) -> Self {
        let repository = Arc::new(ResourceRepository::new());
        repository.load(providers);
        Self::from_repository(repository)
    }

    /// A service backed by a shared provider repository.
    pub fn from_repository(providers: Arc<ResourceRepository<dyn CredentialProvider>>) -> Self {
        Self {
            providers,
            gate: Mutex::new(()),
        }
    }

    /// Add a provider to the end of the chain.
    pub fn with(self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.providers.load(vec![provider]);
        self
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Resolve a credential for `source`, first non-`None` provider wins.
    ///
    /// Returns `Ok(None)` when every provider declines. A provider error is
    /// logged and treated as a decline; the chain continues.
    pub async fn get_credentials(
        &self,
        source: &PluginSource,
        token: &CancellationToken,
    ) -> Result<Option<Credential>> {
        for provider in self.providers.snapshot() {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let _permit = self.gate.lock().await;
            match provider.provide(source).await {
                Ok(Some(credential)) => {
                    tracing::debug!(provider = provider.name(), "credential resolved");
                    return Ok(Some(credential));
                }
                Ok(None) => {
                    tracing::debug!(provider = provider.name(), "provider declined");
                }
                Err(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "provider failed");
                }
            }
        }
        Ok(None)
    }
}
