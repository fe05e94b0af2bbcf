#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! BLAKE3 content hashing for updraft
//!
//! Package identity throughout the engine is the content hash of the
//! bundle archive; this crate provides the hashing and hex codec for it.

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use updraft_errors::{Error, StorageError};

/// Size of chunks for streaming hash computation
const CHUNK_SIZE: usize = 64 * 1024;

/// A BLAKE3 content hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PackageHash {
    bytes: [u8; 32],
}

impl PackageHash {
    /// Compute the hash of a byte slice
    #[must_use]
    pub fn from_data(data: &[u8]) -> Self {
        Self {
            bytes: *blake3::hash(data).as_bytes(),
        }
    }

    /// Compute the hash of a file by streaming it in chunks
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or read.
    pub async fn from_file(path: &Path) -> Result<Self, Error> {
        let mut file = File::open(path)
            .await
            .map_err(|_| StorageError::PathNotFound {
                path: path.display().to_string(),
            })?;

        let mut hasher = Hasher::new();
        let mut buffer = vec![0; CHUNK_SIZE];

        loop {
            let n = file.read(&mut buffer).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }

        Ok(Self {
            bytes: *hasher.finalize().as_bytes(),
        })
    }

    /// Parse from a hex string
    ///
    /// # Errors
    /// Returns an error if the input is not 64 hex characters.
    pub fn from_hex(s: &str) -> Result<Self, Error> {
        let decoded = hex::decode(s).map_err(|e| StorageError::CorruptedData {
            message: format!("invalid hash hex: {e}"),
        })?;

        let bytes: [u8; 32] = decoded
            .try_into()
            .map_err(|v: Vec<u8>| StorageError::CorruptedData {
                message: format!("hash must be 32 bytes, got {}", v.len()),
            })?;

        Ok(Self { bytes })
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }

    /// Whether this hash matches a hex string advertised by the server.
    /// Comparison is case-insensitive on the hex form.
    #[must_use]
    pub fn matches_hex(&self, advertised: &str) -> bool {
        advertised.len() == 64 && self.to_hex() == advertised.to_ascii_lowercase()
    }
}

impl fmt::Display for PackageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for PackageHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PackageHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
