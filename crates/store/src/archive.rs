//! Bundle archive handling
//!
//! Bundles travel as plain tar archives. Extraction rejects entries that
//! would escape the destination directory.

use std::path::{Path, PathBuf};
use tar::Archive;
use updraft_errors::{DownloadError, Error, StorageError};

/// Extract a bundle archive into a directory.
///
/// # Errors
///
/// Returns an error if the archive cannot be read, contains path-traversal
/// entries, or extraction fails.
pub async fn extract_bundle(archive_file: &Path, dest: &Path) -> Result<(), Error> {
    tokio::fs::create_dir_all(dest)
        .await
        .map_err(|e| Error::io_with_path(&e, dest))?;

    let archive_file = archive_file.to_path_buf();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&archive_file).map_err(|e| DownloadError::UnpackFailed {
            message: format!("open {}: {e}", archive_file.display()),
        })?;
        let mut archive = Archive::new(file);
        archive.set_preserve_permissions(true);
        archive.set_unpack_xattrs(false);

        for entry in archive.entries().map_err(unpack_err)? {
            let mut entry = entry.map_err(unpack_err)?;
            let path = entry.path().map_err(unpack_err)?;

            if path
                .components()
                .any(|c| c == std::path::Component::ParentDir)
            {
                return Err(DownloadError::UnpackFailed {
                    message: "archive contains path traversal".to_string(),
                }
                .into());
            }

            entry.unpack_in(&dest).map_err(unpack_err)?;
        }

        Ok::<(), Error>(())
    })
    .await
    .map_err(|e| Error::internal(format!("extract task failed: {e}")))??;

    Ok(())
}

/// Create a bundle archive from a directory. Used by the release helper
/// and by tests; deterministic output so the same contents hash the same.
///
/// # Errors
///
/// Returns an error if the source cannot be read or the archive cannot be
/// written.
pub async fn pack_bundle(src: &Path, archive_file: &Path) -> Result<(), Error> {
    if let Some(parent) = archive_file.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io_with_path(&e, parent))?;
    }

    let src = src.to_path_buf();
    let archive_file = archive_file.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::create(&archive_file).map_err(io_err)?;
        let buf_writer = std::io::BufWriter::new(file);
        let mut builder = tar::Builder::new(buf_writer);

        builder.mode(tar::HeaderMode::Deterministic);
        builder.follow_symlinks(false);

        add_dir_to_tar(&mut builder, &src, Path::new(""))?;
        let buf_writer = builder.into_inner().map_err(io_err)?;
        let file = buf_writer.into_inner().map_err(|e| StorageError::IoError {
            message: e.to_string(),
        })?;
        file.sync_all().map_err(io_err)?;

        Ok::<(), Error>(())
    })
    .await
    .map_err(|e| Error::internal(format!("pack task failed: {e}")))??;

    Ok(())
}

fn add_dir_to_tar<W: std::io::Write>(
    builder: &mut tar::Builder<W>,
    src: &Path,
    prefix: &Path,
) -> Result<(), Error> {
    // Sorted traversal keeps the archive deterministic.
    let mut entries: Vec<PathBuf> = std::fs::read_dir(src)
        .map_err(io_err)?
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(io_err)?
        .into_iter()
        .map(|e| e.path())
        .collect();
    entries.sort();

    for path in entries {
        let name = path.file_name().ok_or_else(|| {
            Error::internal(format!("unnameable entry: {}", path.display()))
        })?;
        let tar_path = prefix.join(name);
        let metadata = std::fs::symlink_metadata(&path).map_err(io_err)?;

        if metadata.is_dir() {
            builder.append_dir(&tar_path, &path).map_err(io_err)?;
            add_dir_to_tar(builder, &path, &tar_path)?;
        } else if metadata.is_file() {
            let mut file = std::fs::File::open(&path).map_err(io_err)?;
            builder.append_file(&tar_path, &mut file).map_err(io_err)?;
        }
        // Symlinks are not part of the bundle contract and are skipped.
    }

    Ok(())
}

fn io_err(e: std::io::Error) -> Error {
    StorageError::IoError {
        message: e.to_string(),
    }
    .into()
}

fn unpack_err(e: std::io::Error) -> Error {
    DownloadError::UnpackFailed {
        message: e.to_string(),
    }
    .into()
}
