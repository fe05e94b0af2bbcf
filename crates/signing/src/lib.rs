#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Bundle signature verification for updraft
//!
//! The engine consumes signature verification as an injected capability so
//! the algorithm stays a host decision. `MinisignVerifier` is the
//! production implementation.

use minisign_verify::{PublicKey, Signature};
use updraft_errors::{Error, SignatureError};

/// Injected verification capability: does `signature` over `payload`
/// verify under `public_key`?
///
/// Implementations return `Ok(false)` for a well-formed signature that
/// does not verify, and an error for malformed inputs.
pub trait BundleVerifier: Send + Sync {
    /// # Errors
    /// Returns an error if the signature or public key cannot be parsed.
    fn verify(&self, payload: &[u8], signature: &str, public_key: &str) -> Result<bool, Error>;
}

/// Minisign-backed verifier over detached signature strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinisignVerifier;

impl BundleVerifier for MinisignVerifier {
    fn verify(&self, payload: &[u8], signature: &str, public_key: &str) -> Result<bool, Error> {
        // Full minisign signature string, including the comment line.
        let sig = Signature::decode(signature).map_err(|e| SignatureError::InvalidFormat {
            reason: e.to_string(),
        })?;

        let pk = PublicKey::from_base64(public_key).map_err(|e| {
            SignatureError::InvalidPublicKey {
                reason: e.to_string(),
            }
        })?;

        Ok(pk.verify(payload, &sig, false).is_ok())
    }
}
