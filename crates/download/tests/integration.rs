//! Integration tests for download, verification and staging cleanup

use httpmock::prelude::*;
use std::sync::Arc;
use tempfile::tempdir;
use updraft_download::{DownloadHandler, SignaturePolicy};
use updraft_errors::{Error, IntegrityError, SignatureError};
use updraft_events::AppEvent;
use updraft_hash::PackageHash;
use updraft_net::NetClient;
use updraft_signing::BundleVerifier;
use updraft_types::{Package, RemotePackage};

/// Test double for the injected crypto capability.
struct StubVerifier {
    accept: bool,
}

impl BundleVerifier for StubVerifier {
    fn verify(&self, _payload: &[u8], _signature: &str, _public_key: &str) -> Result<bool, Error> {
        Ok(self.accept)
    }
}

/// A minimal in-memory tar bundle with one file.
async fn bundle_archive() -> Vec<u8> {
    let dir = tempdir().unwrap();
    let src = dir.path().join("bundle");
    tokio::fs::create_dir_all(&src).await.unwrap();
    tokio::fs::write(src.join("main.js"), b"entry").await.unwrap();

    let archive = dir.path().join("bundle.tar");
    updraft_store::archive::pack_bundle(&src, &archive)
        .await
        .unwrap();
    tokio::fs::read(&archive).await.unwrap()
}

fn remote(server: &MockServer, hash: &str, size: u64) -> RemotePackage {
    RemotePackage {
        package: Package {
            deployment_key: "key-1".to_string(),
            label: "v2".to_string(),
            package_hash: hash.to_string(),
            app_version: "1.0.0".to_string(),
            is_mandatory: false,
            description: None,
        },
        download_url: server.url("/bundle.tar"),
        package_size: size,
    }
}

fn handler(signature: Option<SignaturePolicy>) -> DownloadHandler {
    DownloadHandler::new(NetClient::with_defaults().unwrap(), signature, None)
}

fn policy(accept: bool) -> SignaturePolicy {
    SignaturePolicy {
        verifier: Arc::new(StubVerifier { accept }),
        public_key: "test-key".to_string(),
    }
}

#[tokio::test]
async fn test_download_stages_and_unpacks() {
    let server = MockServer::start();
    let archive = bundle_archive().await;
    let hash = PackageHash::from_data(&archive).to_hex();
    server.mock(|when, then| {
        when.method(GET).path("/bundle.tar");
        then.status(200).body(archive.clone());
    });

    let dir = tempdir().unwrap();
    let staging = dir.path().join("staging-1");
    let staged = handler(None)
        .download(&remote(&server, &hash, archive.len() as u64), staging.clone())
        .await
        .unwrap();

    assert!(!staged.is_pending);
    assert_eq!(staged.local_path, staging.join("contents"));
    assert_eq!(
        tokio::fs::read(staged.local_path.join("main.js"))
            .await
            .unwrap(),
        b"entry"
    );
}

#[tokio::test]
async fn test_hash_mismatch_discards_staging() {
    let server = MockServer::start();
    let archive = bundle_archive().await;
    let wrong_hash = PackageHash::from_data(b"different bytes").to_hex();
    server.mock(|when, then| {
        when.method(GET).path("/bundle.tar");
        then.status(200).body(archive.clone());
    });

    let dir = tempdir().unwrap();
    let staging = dir.path().join("staging-1");
    let err = handler(None)
        .download(&remote(&server, &wrong_hash, 0), staging.clone())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Integrity(IntegrityError::HashMismatch { .. })
    ));
    assert!(!tokio::fs::try_exists(&staging).await.unwrap());
}

#[tokio::test]
async fn test_rejected_signature_discards_staging() {
    let server = MockServer::start();
    let archive = bundle_archive().await;
    let hash = PackageHash::from_data(&archive).to_hex();
    server.mock(|when, then| {
        when.method(GET).path("/bundle.tar");
        then.status(200).body(archive.clone());
    });
    server.mock(|when, then| {
        when.method(GET).path("/bundle.tar.sig");
        then.status(200).body("untrusted signature");
    });

    let dir = tempdir().unwrap();
    let staging = dir.path().join("staging-1");
    let err = handler(Some(policy(false)))
        .download(&remote(&server, &hash, 0), staging.clone())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Signature(SignatureError::VerificationFailed { .. })
    ));
    assert!(!tokio::fs::try_exists(&staging).await.unwrap());
}

#[tokio::test]
async fn test_missing_signature_with_configured_key_fails() {
    let server = MockServer::start();
    let archive = bundle_archive().await;
    let hash = PackageHash::from_data(&archive).to_hex();
    server.mock(|when, then| {
        when.method(GET).path("/bundle.tar");
        then.status(200).body(archive.clone());
    });
    server.mock(|when, then| {
        when.method(GET).path("/bundle.tar.sig");
        then.status(404);
    });

    let dir = tempdir().unwrap();
    let err = handler(Some(policy(true)))
        .download(&remote(&server, &hash, 0), dir.path().join("staging-1"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Signature(SignatureError::MissingSignature)
    ));
}

#[tokio::test]
async fn test_accepted_signature_passes() {
    let server = MockServer::start();
    let archive = bundle_archive().await;
    let hash = PackageHash::from_data(&archive).to_hex();
    server.mock(|when, then| {
        when.method(GET).path("/bundle.tar");
        then.status(200).body(archive.clone());
    });
    server.mock(|when, then| {
        when.method(GET).path("/bundle.tar.sig");
        then.status(200).body("trusted signature");
    });

    let dir = tempdir().unwrap();
    let staged = handler(Some(policy(true)))
        .download(&remote(&server, &hash, 0), dir.path().join("staging-1"))
        .await
        .unwrap();
    assert_eq!(staged.package.package_hash, hash);
}

#[tokio::test]
async fn test_download_emits_lifecycle_events() {
    let server = MockServer::start();
    let archive = bundle_archive().await;
    let hash = PackageHash::from_data(&archive).to_hex();
    server.mock(|when, then| {
        when.method(GET).path("/bundle.tar");
        then.status(200).body(archive.clone());
    });

    let (tx, mut rx) = updraft_events::channel();
    let handler = DownloadHandler::new(NetClient::with_defaults().unwrap(), None, Some(tx));

    let dir = tempdir().unwrap();
    handler
        .download(&remote(&server, &hash, 0), dir.path().join("staging-1"))
        .await
        .unwrap();

    let mut saw_started = false;
    let mut saw_completed = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            AppEvent::DownloadStarted { .. } => saw_started = true,
            AppEvent::DownloadCompleted { .. } => saw_completed = true,
            _ => {}
        }
    }
    assert!(saw_started);
    assert!(saw_completed);
}
