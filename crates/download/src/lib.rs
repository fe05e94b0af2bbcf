#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Package download and verification for updraft
//!
//! `DownloadHandler` streams a remote bundle into a staging directory,
//! checks its content hash against the advertised one, optionally verifies
//! a detached signature through the injected `BundleVerifier`, and unpacks
//! the archive. Staged data is discarded on every failure path; nothing is
//! ever written into a live slot. No retries happen here: a failed
//! download surfaces to the sync caller.

use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use updraft_errors::{DownloadError, Error, IntegrityError, SignatureError};
use updraft_events::{AppEvent, EventEmitter, EventSender};
use updraft_hash::PackageHash;
use updraft_net::NetClient;
use updraft_signing::BundleVerifier;
use updraft_types::{LocalPackage, RemotePackage};

const ARCHIVE_FILE: &str = "bundle.tar";
const CONTENTS_DIR: &str = "contents";

/// Signature requirements for downloaded bundles. When present, every
/// bundle must carry a verifiable companion signature.
#[derive(Clone)]
pub struct SignaturePolicy {
    pub verifier: Arc<dyn BundleVerifier>,
    pub public_key: String,
}

/// Streams remote packages to local storage and verifies them.
#[derive(Clone)]
pub struct DownloadHandler {
    client: NetClient,
    signature: Option<SignaturePolicy>,
    tx: Option<EventSender>,
}

impl EventEmitter for DownloadHandler {
    fn event_sender(&self) -> Option<&EventSender> {
        self.tx.as_ref()
    }
}

impl DownloadHandler {
    #[must_use]
    pub fn new(
        client: NetClient,
        signature: Option<SignaturePolicy>,
        tx: Option<EventSender>,
    ) -> Self {
        Self {
            client,
            signature,
            tx,
        }
    }

    /// Download a remote package into `staging_path` and return the staged
    /// local package on success.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on stream or unpack failure,
    /// `IntegrityError` on a content-hash mismatch and `SignatureError`
    /// when the signature policy is not met. The staging directory is
    /// removed before any of these surface.
    pub async fn download(
        &self,
        remote: &RemotePackage,
        staging_path: PathBuf,
    ) -> Result<LocalPackage, Error> {
        match self.download_inner(remote, &staging_path).await {
            Ok(staged) => Ok(staged),
            Err(e) => {
                self.emit(AppEvent::DownloadFailed {
                    url: remote.download_url.clone(),
                    message: e.to_string(),
                });
                discard_staging(&staging_path).await;
                Err(e)
            }
        }
    }

    async fn download_inner(
        &self,
        remote: &RemotePackage,
        staging_path: &Path,
    ) -> Result<LocalPackage, Error> {
        tokio::fs::create_dir_all(staging_path)
            .await
            .map_err(|e| DownloadError::StagingFailed {
                message: format!("{}: {e}", staging_path.display()),
            })?;

        let archive_path = staging_path.join(ARCHIVE_FILE);
        let downloaded = self
            .stream_to_file(&remote.download_url, &archive_path, remote.package_size)
            .await?;

        if remote.package_size > 0 && downloaded != remote.package_size {
            return Err(DownloadError::SizeMismatch {
                expected: remote.package_size,
                actual: downloaded,
            }
            .into());
        }

        let hash = PackageHash::from_file(&archive_path).await?;
        if !hash.matches_hex(&remote.package.package_hash) {
            return Err(IntegrityError::HashMismatch {
                expected: remote.package.package_hash.clone(),
                actual: hash.to_hex(),
            }
            .into());
        }

        if let Some(policy) = &self.signature {
            self.verify_signature(remote, &archive_path, policy).await?;
        }

        let contents = staging_path.join(CONTENTS_DIR);
        updraft_store::archive::extract_bundle(&archive_path, &contents).await?;

        self.emit(AppEvent::DownloadCompleted {
            package_hash: remote.package.package_hash.clone(),
            bytes_downloaded: downloaded,
        });

        Ok(LocalPackage::staged(remote, contents))
    }

    async fn stream_to_file(
        &self,
        url: &str,
        dest: &Path,
        advertised_size: u64,
    ) -> Result<u64, Error> {
        let response = self.client.get_ok(url).await?;
        let total_bytes = response.content_length().unwrap_or(advertised_size);

        self.emit(AppEvent::DownloadStarted {
            url: url.to_string(),
            total_bytes,
        });

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| Error::io_with_path(&e, dest))?;
        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DownloadError::StreamFailed(e.to_string()))?;
            file.write_all(&chunk).await?;

            downloaded += chunk.len() as u64;
            self.emit(AppEvent::DownloadProgress {
                bytes_downloaded: downloaded,
                total_bytes,
            });
        }
        file.sync_all().await?;

        Ok(downloaded)
    }

    /// Fetch and verify the detached companion signature at
    /// `{download_url}.sig`.
    async fn verify_signature(
        &self,
        remote: &RemotePackage,
        archive_path: &Path,
        policy: &SignaturePolicy,
    ) -> Result<(), Error> {
        let signature_url = format!("{}.sig", remote.download_url);
        let response = self.client.get(&signature_url).await?;
        if response.status().as_u16() == 404 {
            return Err(SignatureError::MissingSignature.into());
        }
        if !response.status().is_success() {
            return Err(SignatureError::VerificationFailed {
                reason: format!(
                    "signature fetch returned HTTP {}",
                    response.status().as_u16()
                ),
            }
            .into());
        }
        let signature = response
            .text()
            .await
            .map_err(|e| DownloadError::StreamFailed(e.to_string()))?;

        let archive = tokio::fs::read(archive_path)
            .await
            .map_err(|e| Error::io_with_path(&e, archive_path))?;

        if !policy
            .verifier
            .verify(&archive, &signature, &policy.public_key)?
        {
            return Err(SignatureError::VerificationFailed {
                reason: "signature does not match bundle".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Remove a staging directory, logging rather than masking the original
/// failure if cleanup itself fails.
async fn discard_staging(staging_path: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(staging_path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(
                path = %staging_path.display(),
                error = %e,
                "failed to clean up staging directory"
            );
        }
    }
}
