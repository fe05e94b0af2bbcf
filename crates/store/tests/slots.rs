//! Integration tests for slot promotion and rollback

use chrono::Utc;
use std::path::Path;
use tempfile::tempdir;
use updraft_errors::{Error, RollbackError};
use updraft_store::PackageStore;
use updraft_types::{LocalPackage, Package};

const KEY: &str = "key-1";

async fn stage_package(store: &PackageStore, label: &str, hash: &str) -> LocalPackage {
    let staging = store.staging_path(KEY);
    let contents = staging.join("contents");
    tokio::fs::create_dir_all(&contents).await.unwrap();
    tokio::fs::write(contents.join("bundle.js"), label)
        .await
        .unwrap();

    LocalPackage {
        package: Package {
            deployment_key: KEY.to_string(),
            label: label.to_string(),
            package_hash: hash.to_string(),
            app_version: "1.0.0".to_string(),
            is_mandatory: false,
            description: None,
        },
        local_path: contents,
        is_pending: false,
        is_first_run: false,
        is_debug_only: false,
        failed_install: false,
        installed_at: Utc::now(),
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap()
}

#[tokio::test]
async fn test_install_promotes_staged_package() {
    let dir = tempdir().unwrap();
    let store = PackageStore::new(dir.path().to_path_buf());

    let staged = stage_package(&store, "v1", "aaa").await;
    let staging_contents = staged.local_path.clone();
    let installed = store.install_package(KEY, staged).await.unwrap();

    assert!(installed.is_pending);
    assert_eq!(installed.local_path, store.package_path(KEY, "aaa"));
    assert!(exists(&installed.local_path.join("bundle.js")).await);
    assert!(!exists(&staging_contents).await);
    assert!(!exists(staging_contents.parent().unwrap()).await);

    let current = store.current_package(KEY).await.unwrap().unwrap();
    assert_eq!(current.package_hash(), "aaa");
    assert!(current.is_pending);
    assert!(store.previous_package(KEY).await.unwrap().is_none());
}

#[tokio::test]
async fn test_second_install_rotates_slots() {
    let dir = tempdir().unwrap();
    let store = PackageStore::new(dir.path().to_path_buf());

    let first = stage_package(&store, "v1", "aaa").await;
    store.install_package(KEY, first).await.unwrap();
    store.clear_pending(KEY).await.unwrap();

    let second = stage_package(&store, "v2", "bbb").await;
    store.install_package(KEY, second).await.unwrap();

    let current = store.current_package(KEY).await.unwrap().unwrap();
    let previous = store.previous_package(KEY).await.unwrap().unwrap();
    assert_eq!(current.package_hash(), "bbb");
    assert!(current.is_pending);
    assert_eq!(previous.package_hash(), "aaa");

    // Both bundles remain reachable through their slots.
    assert!(exists(&store.package_path(KEY, "aaa")).await);
    assert!(exists(&store.package_path(KEY, "bbb")).await);
}

#[tokio::test]
async fn test_third_install_drops_displaced_bundle() {
    let dir = tempdir().unwrap();
    let store = PackageStore::new(dir.path().to_path_buf());

    for (label, hash) in [("v1", "aaa"), ("v2", "bbb"), ("v3", "ccc")] {
        let staged = stage_package(&store, label, hash).await;
        store.install_package(KEY, staged).await.unwrap();
        store.clear_pending(KEY).await.unwrap();
    }

    assert!(!exists(&store.package_path(KEY, "aaa")).await);
    assert!(exists(&store.package_path(KEY, "bbb")).await);
    assert!(exists(&store.package_path(KEY, "ccc")).await);
}

#[tokio::test]
async fn test_current_survives_interrupted_rotation() {
    let dir = tempdir().unwrap();
    let store = PackageStore::new(dir.path().to_path_buf());

    let first = stage_package(&store, "v1", "aaa").await;
    store.install_package(KEY, first).await.unwrap();
    store.clear_pending(KEY).await.unwrap();

    // Replay the on-disk state of an install that died after copying the
    // current record into the backup slot but before the pointer swap.
    let key_root = dir.path().join(KEY);
    tokio::fs::copy(key_root.join("current.json"), key_root.join("previous.json"))
        .await
        .unwrap();
    tokio::fs::copy(key_root.join("current.json"), key_root.join("incoming.json"))
        .await
        .unwrap();

    let current = store.current_package(KEY).await.unwrap().unwrap();
    assert_eq!(current.package_hash(), "aaa");

    // A retried install completes the rotation normally.
    let second = stage_package(&store, "v2", "bbb").await;
    store.install_package(KEY, second).await.unwrap();
    let current = store.current_package(KEY).await.unwrap().unwrap();
    let previous = store.previous_package(KEY).await.unwrap().unwrap();
    assert_eq!(current.package_hash(), "bbb");
    assert_eq!(previous.package_hash(), "aaa");
}

#[tokio::test]
async fn test_rollback_restores_previous() {
    let dir = tempdir().unwrap();
    let store = PackageStore::new(dir.path().to_path_buf());

    let first = stage_package(&store, "v1", "aaa").await;
    store.install_package(KEY, first).await.unwrap();
    store.clear_pending(KEY).await.unwrap();
    let second = stage_package(&store, "v2", "bbb").await;
    store.install_package(KEY, second).await.unwrap();

    let restored = store.rollback(KEY).await.unwrap();
    assert_eq!(restored.package_hash(), "aaa");
    assert!(!restored.is_pending);

    let current = store.current_package(KEY).await.unwrap().unwrap();
    assert_eq!(current.package_hash(), "aaa");
    assert!(store.previous_package(KEY).await.unwrap().is_none());

    // The failed bundle is gone, the restored one is intact.
    assert!(!exists(&store.package_path(KEY, "bbb")).await);
    assert!(exists(&store.package_path(KEY, "aaa").join("bundle.js")).await);
}

#[tokio::test]
async fn test_rollback_without_backup_leaves_current_untouched() {
    let dir = tempdir().unwrap();
    let store = PackageStore::new(dir.path().to_path_buf());

    let staged = stage_package(&store, "v1", "aaa").await;
    store.install_package(KEY, staged).await.unwrap();

    let err = store.rollback(KEY).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Rollback(RollbackError::NoBackupAvailable)
    ));

    let current = store.current_package(KEY).await.unwrap().unwrap();
    assert_eq!(current.package_hash(), "aaa");
    assert!(current.is_pending);
}

#[tokio::test]
async fn test_reinstall_of_stored_hash_reuses_bundle() {
    let dir = tempdir().unwrap();
    let store = PackageStore::new(dir.path().to_path_buf());

    let first = stage_package(&store, "v1", "aaa").await;
    store.install_package(KEY, first).await.unwrap();

    // Same hash arrives again through a fresh staging dir.
    let again = stage_package(&store, "v1", "aaa").await;
    let staging_contents = again.local_path.clone();
    let installed = store.install_package(KEY, again).await.unwrap();

    assert_eq!(installed.local_path, store.package_path(KEY, "aaa"));
    assert!(!exists(&staging_contents).await);
    assert!(exists(&installed.local_path.join("bundle.js")).await);
}

#[tokio::test]
async fn test_clear_updates_drops_both_slots() {
    let dir = tempdir().unwrap();
    let store = PackageStore::new(dir.path().to_path_buf());

    let first = stage_package(&store, "v1", "aaa").await;
    store.install_package(KEY, first).await.unwrap();
    let second = stage_package(&store, "v2", "bbb").await;
    store.install_package(KEY, second).await.unwrap();

    store.clear_updates(KEY).await.unwrap();

    assert!(store.current_package(KEY).await.unwrap().is_none());
    assert!(store.previous_package(KEY).await.unwrap().is_none());
    assert!(!exists(&store.package_path(KEY, "aaa")).await);
}

#[tokio::test]
async fn test_deployment_keys_have_independent_slots() {
    let dir = tempdir().unwrap();
    let store = PackageStore::new(dir.path().to_path_buf());

    let staged = stage_package(&store, "v1", "aaa").await;
    store.install_package(KEY, staged).await.unwrap();

    assert!(store.current_package("other-key").await.unwrap().is_none());
    assert!(store.current_package(KEY).await.unwrap().is_some());
}
