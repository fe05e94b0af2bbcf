//! Host configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use updraft_errors::{ConfigError, Error};

pub const DEFAULT_CONFIG_FILE: &str = "updraft.toml";

/// Contents of `updraft.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    /// Deployment server base URL
    pub server_url: String,
    /// Release channel key issued by the server
    pub deployment_key: String,
    /// Version of the host application, as semver
    pub app_version: String,
    /// Where packages and flags live (default: ./.updraft)
    #[serde(default)]
    pub storage_root: Option<PathBuf>,
    /// Stable install identifier (default: generated per run)
    #[serde(default)]
    pub client_unique_id: Option<String>,
    /// Minisign public key; set it to require signed bundles
    #[serde(default)]
    pub public_key: Option<String>,
}

impl HostConfig {
    /// Load the configuration from `path`, or `updraft.toml` in the
    /// working directory when no path is given.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file is missing or does not parse.
    pub async fn load(path: Option<&Path>) -> Result<Self, Error> {
        let path = path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf);

        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound {
                    path: path.display().to_string(),
                }
                .into())
            }
            Err(e) => return Err(Error::io_with_path(&e, &path)),
        };

        let config: Self = toml::from_str(&raw).map_err(|e| ConfigError::ParseFailed {
            message: format!("{}: {e}", path.display()),
        })?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_minimal_config_parses() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("updraft.toml");
        tokio::fs::write(
            &path,
            r#"
server_url = "https://updates.example.test"
deployment_key = "key-1"
app_version = "1.2.3"
"#,
        )
        .await
        .unwrap();

        let config = HostConfig::load(Some(&path)).await.unwrap();
        assert_eq!(config.deployment_key, "key-1");
        assert!(config.storage_root.is_none());
        assert!(config.public_key.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let err = HostConfig::load(Some(Path::new("/nonexistent/updraft.toml")))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("updraft.toml");
        tokio::fs::write(
            &path,
            r#"
server_url = "https://updates.example.test"
deployment_key = "key-1"
app_version = "1.2.3"
deployment_keey = "typo"
"#,
        )
        .await
        .unwrap();

        let err = HostConfig::load(Some(&path)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::ParseFailed { .. })
        ));
    }
}
