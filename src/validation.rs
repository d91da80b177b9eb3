//! Integrity validation of installed plugins.

use crate::checksum::DirectoryChecksumCalculator;
use crate::registry::InstalledPluginInfo;

/// Re-verifies an installed plugin's files against its registry record.
///
/// Validation fails closed: a plugin whose directory is gone, unreadable,
/// or whose recomputed checksum differs from the recorded one is reported
/// as invalid rather than raising an error.
pub struct InstalledPluginValidator;

impl InstalledPluginValidator {
    pub fn new() -> Self {
        Self
    }

    /// Whether the plugin's install directory still matches its record.
    pub fn validate(&self, info: &InstalledPluginInfo) -> bool {
        if !info.install_path.is_dir() {
            tracing::warn!(
                plugin = %info.identity,
                path = %info.install_path.display(),
                "installed plugin directory is missing"
            );
            return false;
        }

        match DirectoryChecksumCalculator::checksum(&info.install_path) {
            Ok(computed) if computed == info.checksum => true,
            Ok(computed) => {
                tracing::warn!(
                    plugin = %info.identity,
                    expected = %info.checksum,
                    %computed,
                    "installed plugin checksum mismatch"
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    plugin = %info.identity,
                    error = %e,
                    "failed to recompute installed plugin checksum"
                );
                false
            }
        }
    }
}

impl Default for InstalledPluginValidator {
    fn default() -> Self {
        Self::new()
    }
}
