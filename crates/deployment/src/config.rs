//! Deployment instance configuration

use crate::platform::PlatformHooks;
use semver::Version;
use std::path::PathBuf;
use updraft_errors::{ConfigError, Error};
use uuid::Uuid;

/// Configuration of one deployment instance.
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    /// Deployment server base URL
    pub server_url: String,
    /// Default release channel; individual syncs may override it
    pub deployment_key: String,
    /// Version of the running host binary
    pub app_version: Version,
    /// Stable identifier for this installation, sent with every request
    pub client_unique_id: String,
    /// Root directory for packages and durable flags
    pub storage_root: PathBuf,
    /// Running under a debug/local bundle; installs are marked
    /// `is_debug_only` and skip rollback bookkeeping
    pub is_debug_mode: bool,
    /// Public key for bundle signature verification; unset disables the
    /// signature requirement
    pub public_key: Option<String>,
}

impl DeploymentConfig {
    #[must_use]
    pub fn builder() -> DeploymentConfigBuilder {
        DeploymentConfigBuilder::default()
    }
}

/// Builder for `DeploymentConfig`. Storage root and app version fall back
/// to the platform hooks when not set explicitly.
#[derive(Debug, Default)]
pub struct DeploymentConfigBuilder {
    server_url: Option<String>,
    deployment_key: Option<String>,
    app_version: Option<Version>,
    client_unique_id: Option<String>,
    storage_root: Option<PathBuf>,
    is_debug_mode: bool,
    public_key: Option<String>,
}

impl DeploymentConfigBuilder {
    #[must_use]
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn deployment_key(mut self, key: impl Into<String>) -> Self {
        self.deployment_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn app_version(mut self, version: Version) -> Self {
        self.app_version = Some(version);
        self
    }

    #[must_use]
    pub fn client_unique_id(mut self, id: impl Into<String>) -> Self {
        self.client_unique_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.storage_root = Some(root.into());
        self
    }

    #[must_use]
    pub fn debug_mode(mut self, debug: bool) -> Self {
        self.is_debug_mode = debug;
        self
    }

    #[must_use]
    pub fn public_key(mut self, key: impl Into<String>) -> Self {
        self.public_key = Some(key.into());
        self
    }

    /// Finish the configuration, filling platform-derived defaults.
    ///
    /// # Errors
    /// Returns `ConfigError` if a required field is missing or the
    /// platform-reported app version does not parse as semver.
    pub fn build(self, platform: &dyn PlatformHooks) -> Result<DeploymentConfig, Error> {
        let server_url = self
            .server_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ConfigError::Invalid {
                message: "server_url is required".to_string(),
            })?;
        let deployment_key = self
            .deployment_key
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ConfigError::Invalid {
                message: "deployment_key is required".to_string(),
            })?;

        let app_version = match self.app_version {
            Some(version) => version,
            None => {
                let reported = platform.current_app_version();
                Version::parse(&reported).map_err(|e| ConfigError::Invalid {
                    message: format!("platform app version '{reported}' is not semver: {e}"),
                })?
            }
        };

        Ok(DeploymentConfig {
            server_url,
            deployment_key,
            app_version,
            client_unique_id: self
                .client_unique_id
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            storage_root: self.storage_root.unwrap_or_else(|| platform.storage_root()),
            is_debug_mode: self.is_debug_mode,
            public_key: self.public_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakePlatform;

    impl PlatformHooks for FakePlatform {
        fn storage_root(&self) -> PathBuf {
            PathBuf::from("/tmp/updraft-test")
        }

        fn current_app_version(&self) -> String {
            "1.2.3".to_string()
        }

        fn perform_restart(&self) -> Result<(), Error> {
            Ok(())
        }
    }

    #[test]
    fn test_platform_defaults_fill_in() {
        let config = DeploymentConfig::builder()
            .server_url("https://updates.example.test")
            .deployment_key("key-1")
            .build(&FakePlatform)
            .unwrap();

        assert_eq!(config.app_version, Version::new(1, 2, 3));
        assert_eq!(config.storage_root, PathBuf::from("/tmp/updraft-test"));
        assert!(!config.client_unique_id.is_empty());
    }

    #[test]
    fn test_missing_deployment_key_is_rejected() {
        let result = DeploymentConfig::builder()
            .server_url("https://updates.example.test")
            .build(&FakePlatform);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
