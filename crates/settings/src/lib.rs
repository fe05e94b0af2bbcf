#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Durable flags for the updraft update engine
//!
//! `SettingManager` persists the small record set rollback detection
//! depends on: the failed-hash set, the pending install mode, the
//! pending-update marker and the first-run flag. Every setter re-reads the
//! backing JSON document, applies the change and rewrites it atomically
//! (temp file, fsync, rename) before returning, so a flag that was set is
//! set after a crash too, and a manager never overwrites flags written
//! through another handle on the same document.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use updraft_errors::{Error, SettingsError};
use updraft_types::InstallMode;

const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
struct SettingsDocument {
    /// Hashes recorded as having failed to boot; never auto-installed again
    #[serde(default)]
    failed_hashes: BTreeSet<String>,
    /// Install mode saved for the package currently awaiting application
    #[serde(default)]
    pending_install_mode: Option<InstallMode>,
    /// Hash installed but not yet confirmed by the ready call
    #[serde(default)]
    pending_update_hash: Option<String>,
    /// Hash whose first launch has not happened yet
    #[serde(default)]
    first_run_hash: Option<String>,
}

/// Durable key-value flags scoped to one deployment key.
pub struct SettingManager {
    path: PathBuf,
    data: Mutex<SettingsDocument>,
}

impl SettingManager {
    /// Open (or create) the settings document under a deployment key's
    /// storage directory.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created or an existing
    /// document cannot be parsed.
    pub async fn open(key_root: &Path) -> Result<Self, Error> {
        tokio::fs::create_dir_all(key_root)
            .await
            .map_err(|e| Error::io_with_path(&e, key_root))?;

        let path = key_root.join(SETTINGS_FILE);
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| SettingsError::CorruptedData {
                    message: format!("{}: {e}", path.display()),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SettingsDocument::default(),
            Err(e) => return Err(Error::io_with_path(&e, &path)),
        };

        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    /// Record that a package hash failed to boot. Idempotent.
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn record_failed_update(&self, hash: &str) -> Result<(), Error> {
        self.mutate(|data| data.failed_hashes.insert(hash.to_string()))
            .await
    }

    pub async fn is_failed_hash(&self, hash: &str) -> bool {
        self.data.lock().await.failed_hashes.contains(hash)
    }

    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn save_pending_install_mode(&self, mode: InstallMode) -> Result<(), Error> {
        self.mutate(|data| {
            data.pending_install_mode = Some(mode);
            true
        })
        .await
    }

    pub async fn pending_install_mode(&self) -> Option<InstallMode> {
        self.data.lock().await.pending_install_mode
    }

    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn remove_pending_install_mode(&self) -> Result<(), Error> {
        self.mutate(|data| data.pending_install_mode.take().is_some())
            .await
    }

    /// Mark a hash as installed-but-unconfirmed. Read back at the next
    /// process start to decide whether rollback detection applies.
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn mark_pending_update(&self, hash: &str) -> Result<(), Error> {
        self.mutate(|data| {
            data.pending_update_hash = Some(hash.to_string());
            true
        })
        .await
    }

    pub async fn pending_update_hash(&self) -> Option<String> {
        self.data.lock().await.pending_update_hash.clone()
    }

    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn remove_pending_update(&self) -> Result<(), Error> {
        self.mutate(|data| data.pending_update_hash.take().is_some())
            .await
    }

    /// Arm the first-run flag for a freshly installed hash.
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn mark_first_run_flag(&self, hash: &str) -> Result<(), Error> {
        self.mutate(|data| {
            data.first_run_hash = Some(hash.to_string());
            true
        })
        .await
    }

    /// Whether `hash` has not completed its first launch yet.
    pub async fn is_first_run(&self, hash: &str) -> bool {
        self.data.lock().await.first_run_hash.as_deref() == Some(hash)
    }

    /// Consume the first-run flag for `hash`. Returns whether it was armed.
    ///
    /// # Errors
    /// Returns an error if the document cannot be persisted.
    pub async fn take_first_run_flag(&self, hash: &str) -> Result<bool, Error> {
        let mut data = self.data.lock().await;
        let mut fresh = self.load().await?;
        let taken = fresh.first_run_hash.as_deref() == Some(hash);
        if taken {
            fresh.first_run_hash = None;
            self.persist(&fresh).await?;
        }
        *data = fresh;
        Ok(taken)
    }

    /// Read-modify-write against the document on disk, not the cache, so
    /// a stale in-memory snapshot can never erase flags another handle
    /// persisted in the meantime.
    async fn mutate<F>(&self, apply: F) -> Result<(), Error>
    where
        F: FnOnce(&mut SettingsDocument) -> bool,
    {
        let mut data = self.data.lock().await;
        let mut fresh = self.load().await?;
        if apply(&mut fresh) {
            self.persist(&fresh).await?;
        }
        *data = fresh;
        Ok(())
    }

    async fn load(&self) -> Result<SettingsDocument, Error> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|e| {
                    SettingsError::CorruptedData {
                        message: format!("{}: {e}", self.path.display()),
                    }
                    .into()
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(SettingsDocument::default())
            }
            Err(e) => Err(Error::io_with_path(&e, &self.path)),
        }
    }

    async fn persist(&self, data: &SettingsDocument) -> Result<(), Error> {
        let bytes = serde_json::to_vec_pretty(data)?;
        let tmp = self.path.with_extension("json.tmp");

        let mut file = tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| SettingsError::PersistFailed {
                message: format!("create {}: {e}", tmp.display()),
            })?;
        file.write_all(&bytes)
            .await
            .map_err(|e| SettingsError::PersistFailed {
                message: format!("write {}: {e}", tmp.display()),
            })?;
        // The durability contract: the flag must survive process death.
        file.sync_all()
            .await
            .map_err(|e| SettingsError::PersistFailed {
                message: format!("sync {}: {e}", tmp.display()),
            })?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| SettingsError::PersistFailed {
                message: format!("rename into {}: {e}", self.path.display()),
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_flags_survive_reopen() {
        let dir = tempdir().unwrap();

        let settings = SettingManager::open(dir.path()).await.unwrap();
        settings.record_failed_update("abc").await.unwrap();
        settings
            .save_pending_install_mode(InstallMode::OnNextResume)
            .await
            .unwrap();
        settings.mark_pending_update("xyz").await.unwrap();
        settings.mark_first_run_flag("xyz").await.unwrap();
        drop(settings);

        let reopened = SettingManager::open(dir.path()).await.unwrap();
        assert!(reopened.is_failed_hash("abc").await);
        assert!(!reopened.is_failed_hash("xyz").await);
        assert_eq!(
            reopened.pending_install_mode().await,
            Some(InstallMode::OnNextResume)
        );
        assert_eq!(reopened.pending_update_hash().await, Some("xyz".to_string()));
        assert!(reopened.is_first_run("xyz").await);
    }

    #[tokio::test]
    async fn test_take_first_run_flag_consumes() {
        let dir = tempdir().unwrap();
        let settings = SettingManager::open(dir.path()).await.unwrap();

        settings.mark_first_run_flag("abc").await.unwrap();
        assert!(settings.take_first_run_flag("abc").await.unwrap());
        assert!(!settings.take_first_run_flag("abc").await.unwrap());
        assert!(!settings.is_first_run("abc").await);
    }

    #[tokio::test]
    async fn test_removals_are_idempotent() {
        let dir = tempdir().unwrap();
        let settings = SettingManager::open(dir.path()).await.unwrap();

        settings.remove_pending_install_mode().await.unwrap();
        settings.remove_pending_update().await.unwrap();

        settings.mark_pending_update("abc").await.unwrap();
        settings.remove_pending_update().await.unwrap();
        assert_eq!(settings.pending_update_hash().await, None);
    }

    #[tokio::test]
    async fn test_stale_handle_does_not_erase_newer_writes() {
        let dir = tempdir().unwrap();

        let first = SettingManager::open(dir.path()).await.unwrap();
        first.mark_first_run_flag("h1").await.unwrap();

        // A second handle on the same document records a failed hash the
        // first handle's cache has never seen.
        let second = SettingManager::open(dir.path()).await.unwrap();
        second.record_failed_update("h2").await.unwrap();

        assert!(first.take_first_run_flag("h1").await.unwrap());

        let reopened = SettingManager::open(dir.path()).await.unwrap();
        assert!(reopened.is_failed_hash("h2").await);
        assert!(!reopened.is_first_run("h1").await);
    }

    #[tokio::test]
    async fn test_corrupted_document_is_an_error() {
        let dir = tempdir().unwrap();
        tokio::fs::write(dir.path().join(SETTINGS_FILE), b"{not json")
            .await
            .unwrap();

        assert!(SettingManager::open(dir.path()).await.is_err());
    }
}
