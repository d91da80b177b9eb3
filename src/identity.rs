//! Plugin identity: the (group, id, version) triple uniquely naming a plugin.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use semver::Version;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("plugin id must not be empty")]
    EmptyId,
}

/// Uniquely names a plugin.
///
/// Group and id compare case-insensitively; the version compares
/// structurally. The identity is the primary key for registry lookups and
/// deduplication, so `Hash` is consistent with `Eq` and does not depend on
/// the original casing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginIdentity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group: Option<String>,
    id: String,
    version: Version,
}

impl PluginIdentity {
    /// Create an identity without a group namespace.
    pub fn new(id: impl Into<String>, version: Version) -> Result<Self, IdentityError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdentityError::EmptyId);
        }
        Ok(Self {
            group: None,
            id,
            version,
        })
    }

    /// Create an identity with a group namespace.
    pub fn with_group(
        group: impl Into<String>,
        id: impl Into<String>,
        version: Version,
    ) -> Result<Self, IdentityError> {
        let mut identity = Self::new(id, version)?;
        identity.group = Some(group.into());
        Ok(identity)
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    /// Whether two identities name the same plugin, ignoring the version.
    pub fn same_plugin(&self, other: &Self) -> bool {
        fold_opt(self.group.as_deref()) == fold_opt(other.group.as_deref())
            && fold(&self.id) == fold(&other.id)
    }
}

fn fold(s: &str) -> String {
    s.to_lowercase()
}

fn fold_opt(s: Option<&str>) -> Option<String> {
    s.map(fold)
}

impl PartialEq for PluginIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.same_plugin(other) && self.version == other.version
    }
}

impl Eq for PluginIdentity {}

impl Hash for PluginIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        fold_opt(self.group.as_deref()).hash(state);
        fold(&self.id).hash(state);
        self.version.hash(state);
    }
}

impl PartialOrd for PluginIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PluginIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        fold_opt(self.group.as_deref())
            .cmp(&fold_opt(other.group.as_deref()))
            .then_with(|| fold(&self.id).cmp(&fold(&other.id)))
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl fmt::Display for PluginIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.group {
            Some(group) => write!(f, "{}/{}@{}", group, self.id, self.version),
            None => write!(f, "{}@{}", self.id, self.version),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_rejects_empty_id() {
        assert!(matches!(
            PluginIdentity::new("", v("1.0.0")),
            Err(IdentityError::EmptyId)
        ));
    }

    #[test]
    fn test_equality_is_case_insensitive() {
        let a = PluginIdentity::new("MyPlugin", v("1.0.0")).unwrap();
        let b = PluginIdentity::new("myplugin", v("1.0.0")).unwrap();
        assert_eq!(a, b);

        let c = PluginIdentity::with_group("Contoso", "myplugin", v("1.0.0")).unwrap();
        let d = PluginIdentity::with_group("contoso", "MYPLUGIN", v("1.0.0")).unwrap();
        assert_eq!(c, d);
        assert_ne!(a, c);
    }

    #[test]
    fn test_version_distinguishes() {
        let a = PluginIdentity::new("a", v("1.0.0")).unwrap();
        let b = PluginIdentity::new("A", v("1.0.1")).unwrap();
        assert_ne!(a, b);
        assert!(a.same_plugin(&b));
    }

    #[test]
    fn test_hash_consistent_with_eq() {
        let mut set = HashSet::new();
        set.insert(PluginIdentity::new("MyPlugin", v("1.0.0")).unwrap());
        assert!(set.contains(&PluginIdentity::new("myplugin", v("1.0.0")).unwrap()));
        assert!(!set.contains(&PluginIdentity::new("myplugin", v("2.0.0")).unwrap()));
    }

    #[test]
    fn test_ordering_by_group_id_version() {
        let mut identities = vec![
            PluginIdentity::new("b", v("1.0.0")).unwrap(),
            PluginIdentity::new("a", v("2.0.0")).unwrap(),
            PluginIdentity::new("a", v("1.0.0")).unwrap(),
            PluginIdentity::with_group("g", "a", v("1.0.0")).unwrap(),
        ];
        identities.sort();
        assert_eq!(identities[0].id(), "a");
        assert_eq!(identities[0].version(), &v("1.0.0"));
        assert_eq!(identities[1].version(), &v("2.0.0"));
        assert_eq!(identities[2].id(), "b");
        assert!(identities[3].group().is_some());
    }

    #[test]
    fn test_prerelease_ordering() {
        let pre = PluginIdentity::new("a", v("1.0.0-beta.1")).unwrap();
        let rel = PluginIdentity::new("a", v("1.0.0")).unwrap();
        assert!(pre < rel);
    }

    #[test]
    fn test_display() {
        let plain = PluginIdentity::new("my-plugin", v("1.2.3")).unwrap();
        assert_eq!(plain.to_string(), "my-plugin@1.2.3");

        let grouped = PluginIdentity::with_group("contoso", "my-plugin", v("1.2.3")).unwrap();
        assert_eq!(grouped.to_string(), "contoso/my-plugin@1.2.3");
    }

    #[test]
    fn test_serde_roundtrip() {
        let identity = PluginIdentity::with_group("contoso", "my-plugin", v("1.2.3")).unwrap();
        let json = serde_json::to_string(&identity).unwrap();
        let parsed: PluginIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(identity, parsed);

        // Group is omitted when absent.
        let plain = PluginIdentity::new("solo", v("0.1.0")).unwrap();
        let json = serde_json::to_string(&plain).unwrap();
        assert!(!json.contains("group"));
    }
}
