//! Credential provider trait.

use async_trait::async_trait;

use crate::Result;
use crate::discovery::PluginSource;

/// A credential usable against a plugin source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Bearer token attached as an `Authorization` header.
    Bearer(String),
    /// HTTP basic authentication.
    Basic { username: String, password: String },
}

/// Trait for resolving credentials for a plugin source.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Provider name for ordering and debugging.
    fn name(&self) -> &str;

    /// Resolve a credential for `source`.
    ///
    /// `Ok(None)` means the provider declines; that is a normal negative
    /// result, not an error.
    async fn provide(&self, source: &PluginSource) -> Result<Option<Credential>>;
}
