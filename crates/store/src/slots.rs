//! Current/previous slot management

use crate::{CURRENT_RECORD, INCOMING_RECORD, PACKAGES_DIR, PREVIOUS_RECORD};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use updraft_errors::{Error, InstallError, RollbackError, StorageError};
use updraft_types::LocalPackage;
use uuid::Uuid;

/// Store manager for the per-deployment-key slot pairs.
#[derive(Debug, Clone)]
pub struct PackageStore {
    root: PathBuf,
}

impl PackageStore {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Storage directory for one deployment key.
    #[must_use]
    pub fn key_root(&self, deployment_key: &str) -> PathBuf {
        self.root.join(deployment_key)
    }

    /// Content-addressed bundle directory for a package hash.
    #[must_use]
    pub fn package_path(&self, deployment_key: &str, package_hash: &str) -> PathBuf {
        self.key_root(deployment_key)
            .join(PACKAGES_DIR)
            .join(package_hash)
    }

    /// A fresh staging directory path for an in-flight download. Not
    /// created here; the download handler creates and owns it.
    #[must_use]
    pub fn staging_path(&self, deployment_key: &str) -> PathBuf {
        self.key_root(deployment_key)
            .join(format!("staging-{}", Uuid::new_v4()))
    }

    /// Read the current slot. Does not touch the network.
    ///
    /// # Errors
    /// Returns an error if an existing record cannot be read or parsed.
    pub async fn current_package(&self, deployment_key: &str) -> Result<Option<LocalPackage>, Error> {
        read_record(&self.key_root(deployment_key).join(CURRENT_RECORD)).await
    }

    /// Read the previous (backup) slot.
    ///
    /// # Errors
    /// Returns an error if an existing record cannot be read or parsed.
    pub async fn previous_package(
        &self,
        deployment_key: &str,
    ) -> Result<Option<LocalPackage>, Error> {
        read_record(&self.key_root(deployment_key).join(PREVIOUS_RECORD)).await
    }

    /// Whether the current package is still awaiting its ready
    /// confirmation.
    ///
    /// # Errors
    /// Returns an error if the current record cannot be read.
    pub async fn has_pending_update(&self, deployment_key: &str) -> Result<bool, Error> {
        Ok(self
            .current_package(deployment_key)
            .await?
            .is_some_and(|p| p.is_pending))
    }

    /// Promote a staged package into the current slot.
    ///
    /// Moves the staged bundle into the content-addressed area, writes the
    /// incoming record, copies the current record into the previous slot,
    /// then renames the incoming record over current. Returns the promoted
    /// record with `is_pending = true`.
    ///
    /// # Errors
    /// Returns `InstallError` if any filesystem step fails; on failure the
    /// previously current package is left intact.
    pub async fn install_package(
        &self,
        deployment_key: &str,
        staged: LocalPackage,
    ) -> Result<LocalPackage, Error> {
        let key_root = self.key_root(deployment_key);
        let staged_contents = staged.local_path.clone();
        if !path_exists(&staged_contents).await {
            return Err(InstallError::StagingMissing {
                path: staged_contents.display().to_string(),
            }
            .into());
        }

        let bundle_dir = self.package_path(deployment_key, staged.package_hash());
        move_into_place(&staged_contents, &bundle_dir).await?;
        remove_staging_shell(&staged_contents).await;

        let mut record = staged;
        record.local_path = bundle_dir;
        record.is_pending = true;

        let incoming = key_root.join(INCOMING_RECORD);
        let current = key_root.join(CURRENT_RECORD);
        let previous = key_root.join(PREVIOUS_RECORD);

        // Phase one: the incoming record exists in full before any pointer
        // moves.
        write_record(&incoming, &record).await?;

        // Phase two: copy the displaced current into the backup slot, then
        // atomically rename the incoming record over current. The current
        // record stays readable at every instant of the rotation.
        let dropped = read_record(&previous).await.unwrap_or(None);
        if let Some(displaced) = read_record(&current).await.unwrap_or(None) {
            write_record(&previous, &displaced).await?;
        }
        rename(&incoming, &current)
            .await
            .map_err(|e| InstallError::SlotSwapFailed {
                message: format!("promoting incoming record: {e}"),
            })?;

        // The bundle that fell out of the slot pair is unreachable now
        // unless another slot still names the same hash.
        if let Some(old) = dropped {
            self.remove_bundle_if_unreferenced(deployment_key, old.package_hash())
                .await?;
        }

        Ok(record)
    }

    /// Restore the previous package into the current slot.
    ///
    /// # Errors
    /// Returns `RollbackError::NoBackupAvailable` if there is no previous
    /// package; the current package is left untouched in that case.
    pub async fn rollback(&self, deployment_key: &str) -> Result<LocalPackage, Error> {
        let key_root = self.key_root(deployment_key);
        let current_path = key_root.join(CURRENT_RECORD);
        let previous_path = key_root.join(PREVIOUS_RECORD);
        let incoming = key_root.join(INCOMING_RECORD);

        let Some(mut restored) = read_record(&previous_path).await? else {
            return Err(RollbackError::NoBackupAvailable.into());
        };
        let failed = read_record(&current_path).await?;

        restored.is_pending = false;

        // Same two-phase shape as install: full record first, then swap.
        write_record(&incoming, &restored).await?;
        rename(&incoming, &current_path)
            .await
            .map_err(|e| RollbackError::RestoreFailed {
                message: format!("promoting restored record: {e}"),
            })?;
        remove_file_if_exists(&previous_path).await?;

        if let Some(failed) = failed {
            self.remove_bundle_if_unreferenced(deployment_key, failed.package_hash())
                .await?;
        }

        Ok(restored)
    }

    /// Clear the pending flag on the current package after the host
    /// confirmed it booted correctly.
    ///
    /// # Errors
    /// Returns an error if the record cannot be rewritten.
    pub async fn clear_pending(&self, deployment_key: &str) -> Result<Option<LocalPackage>, Error> {
        let current_path = self.key_root(deployment_key).join(CURRENT_RECORD);
        let Some(mut record) = read_record(&current_path).await? else {
            return Ok(None);
        };
        if record.is_pending {
            record.is_pending = false;
            write_record(&current_path, &record).await?;
        }
        Ok(Some(record))
    }

    /// Debug/test reset: drop both slots and every stored bundle for the
    /// deployment key.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be removed.
    pub async fn clear_updates(&self, deployment_key: &str) -> Result<(), Error> {
        let key_root = self.key_root(deployment_key);
        if path_exists(&key_root).await {
            remove_file_if_exists(&key_root.join(CURRENT_RECORD)).await?;
            remove_file_if_exists(&key_root.join(PREVIOUS_RECORD)).await?;
            remove_file_if_exists(&key_root.join(INCOMING_RECORD)).await?;
            let packages = key_root.join(PACKAGES_DIR);
            if path_exists(&packages).await {
                tokio::fs::remove_dir_all(&packages)
                    .await
                    .map_err(|e| Error::io_with_path(&e, &packages))?;
            }
        }
        Ok(())
    }

    async fn remove_bundle_if_unreferenced(
        &self,
        deployment_key: &str,
        package_hash: &str,
    ) -> Result<(), Error> {
        let still_named = |slot: &Option<LocalPackage>| {
            slot.as_ref()
                .is_some_and(|p| p.package_hash() == package_hash)
        };
        let current = self.current_package(deployment_key).await?;
        let previous = self.previous_package(deployment_key).await?;
        if still_named(&current) || still_named(&previous) {
            return Ok(());
        }

        let bundle = self.package_path(deployment_key, package_hash);
        if path_exists(&bundle).await {
            tokio::fs::remove_dir_all(&bundle)
                .await
                .map_err(|e| Error::io_with_path(&e, &bundle))?;
        }
        Ok(())
    }
}

async fn read_record(path: &Path) -> Result<Option<LocalPackage>, Error> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let record =
                serde_json::from_slice(&bytes).map_err(|e| StorageError::CorruptedData {
                    message: format!("{}: {e}", path.display()),
                })?;
            Ok(Some(record))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io_with_path(&e, path)),
    }
}

/// Write a slot record atomically: full temp file first, then rename over
/// the destination, so a crash never leaves a torn record behind.
async fn write_record(path: &Path, record: &LocalPackage) -> Result<(), Error> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_with_path(&e, parent))?;
    }

    let bytes = serde_json::to_vec_pretty(record)?;
    let tmp = path.with_extension("json.tmp");
    let mut file =
        tokio::fs::File::create(&tmp)
            .await
            .map_err(|e| InstallError::MetadataWriteFailed {
                message: format!("create {}: {e}", tmp.display()),
            })?;
    file.write_all(&bytes)
        .await
        .map_err(|e| InstallError::MetadataWriteFailed {
            message: format!("write {}: {e}", tmp.display()),
        })?;
    file.sync_all()
        .await
        .map_err(|e| InstallError::MetadataWriteFailed {
            message: format!("sync {}: {e}", tmp.display()),
        })?;
    drop(file);

    rename(&tmp, path)
        .await
        .map_err(|e| InstallError::MetadataWriteFailed {
            message: format!("rename into {}: {e}", path.display()),
        })?;
    Ok(())
}

async fn move_into_place(src: &Path, dest: &Path) -> Result<(), Error> {
    if path_exists(dest).await {
        // Content-addressed: an existing bundle with this hash is the same
        // bundle. Drop the duplicate staging copy.
        tokio::fs::remove_dir_all(src)
            .await
            .map_err(|e| Error::io_with_path(&e, src))?;
        return Ok(());
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_with_path(&e, parent))?;
    }
    rename(src, dest)
        .await
        .map_err(|e| InstallError::FilesystemError {
            operation: "rename".to_string(),
            path: dest.display().to_string(),
            message: e.to_string(),
        })?;
    Ok(())
}

/// Best-effort removal of the staging directory (and the downloaded
/// archive still inside it) once its contents moved into the store.
async fn remove_staging_shell(staged_contents: &Path) {
    let Some(parent) = staged_contents.parent() else {
        return;
    };
    let is_staging = parent
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("staging-"));
    if is_staging {
        let _ = tokio::fs::remove_dir_all(parent).await;
    }
}

async fn rename(from: &Path, to: &Path) -> std::io::Result<()> {
    tokio::fs::rename(from, to).await
}

async fn remove_file_if_exists(path: &Path) -> Result<(), Error> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io_with_path(&e, path)),
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
