//! Package descriptors shared by the remote and local update paths

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Common descriptor for an update bundle, shared by the remote and local
/// variants. Identity is the content hash: labels are server-assigned and
/// may repeat across unrelated deployment keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    /// Release channel this package belongs to
    pub deployment_key: String,
    /// Server-assigned version label, unique within a deployment key
    pub label: String,
    /// Content hash of the bundle archive
    pub package_hash: String,
    /// Host application version this package targets
    pub app_version: String,
    /// Server hint that the update should not be deferrable
    pub is_mandatory: bool,
    /// Free-text release notes
    pub description: Option<String>,
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.package_hash == other.package_hash
    }
}

impl Eq for Package {}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label, self.package_hash)
    }
}

/// An update advertised by the deployment server. Transient: produced by
/// the acquisition layer and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePackage {
    #[serde(flatten)]
    pub package: Package,
    /// Where to fetch the bundle archive
    pub download_url: String,
    /// Advertised archive size in bytes
    pub package_size: u64,
}

/// A package that exists on disk, either staged or occupying a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalPackage {
    #[serde(flatten)]
    pub package: Package,
    /// Filesystem location of the unpacked bundle
    pub local_path: PathBuf,
    /// True from install until the ready confirmation (or a rollback)
    pub is_pending: bool,
    /// True exactly on the first launch after this package became current
    #[serde(default)]
    pub is_first_run: bool,
    /// Installed while running a debug/local bundle; exempt from install
    /// semantics and rollback bookkeeping
    #[serde(default)]
    pub is_debug_only: bool,
    /// This hash has been recorded as having failed to boot
    #[serde(default)]
    pub failed_install: bool,
    /// When this package was promoted into a slot
    pub installed_at: DateTime<Utc>,
}

impl LocalPackage {
    /// Build the staged local variant of a remote package.
    #[must_use]
    pub fn staged(remote: &RemotePackage, local_path: PathBuf) -> Self {
        Self {
            package: remote.package.clone(),
            local_path,
            is_pending: false,
            is_first_run: false,
            is_debug_only: false,
            failed_install: false,
            installed_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn package_hash(&self) -> &str {
        &self.package.package_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(label: &str, hash: &str) -> Package {
        Package {
            deployment_key: "key-1".to_string(),
            label: label.to_string(),
            package_hash: hash.to_string(),
            app_version: "1.0.0".to_string(),
            is_mandatory: false,
            description: None,
        }
    }

    #[test]
    fn test_identity_is_hash_not_label() {
        assert_eq!(package("v1", "abc"), package("v7", "abc"));
        assert_ne!(package("v1", "abc"), package("v1", "xyz"));
    }

    #[test]
    fn test_local_package_roundtrip() {
        let remote = RemotePackage {
            package: package("v2", "abc"),
            download_url: "https://example.test/bundle".to_string(),
            package_size: 42,
        };
        let local = LocalPackage::staged(&remote, PathBuf::from("/tmp/staged"));
        let json = serde_json::to_string(&local).unwrap();
        let back: LocalPackage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, local);
        assert!(!back.is_pending);
    }
}
