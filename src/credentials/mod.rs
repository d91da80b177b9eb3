//! Credential acquisition for plugin sources.
//!
//! Providers are consulted in a fixed order; the first one that yields a
//! credential wins. Provider calls are globally serialized because a
//! provider may prompt interactively and must never be invoked twice at
//! once.

mod provider;
mod service;

pub use provider::{Credential, CredentialProvider};
pub use service::CredentialService;
