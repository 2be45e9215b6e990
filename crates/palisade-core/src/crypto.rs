//! HMAC helpers and timing-safe comparison.
//!
//! Signature verification must not leak how many leading bytes of a
//! presented hash match the expected one. [`constant_time_eq`] therefore
//! never compares attacker-influenced bytes directly: both sides are run
//! through HMAC under a fresh random key first, and the two fixed-length
//! tags are compared with `subtle`. This defeats prefix-timing disclosure
//! as well as any short-circuit inside the platform's memory compare.

use hmac::{Hmac, Mac};
use palisade_error::{ProxyError, Result};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use subtle::ConstantTimeEq;

/// Digest algorithm for operation-hash signatures.
///
/// Selected by configuration only, never by request input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// HMAC-SHA-1 (legacy deployments).
    Sha1,
    /// HMAC-SHA-256 (default).
    #[default]
    Sha256,
    /// HMAC-SHA-384.
    Sha384,
    /// HMAC-SHA-512.
    Sha512,
}

impl HashAlgorithm {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }
}

/// Compute an HMAC over `message` and return the lowercase hex digest.
///
/// # Errors
///
/// Returns [`ProxyError::Internal`] if the MAC cannot be keyed; HMAC accepts
/// keys of any length, so this does not happen in practice.
pub fn hmac_hex(key: &[u8], message: &[u8], algorithm: HashAlgorithm) -> Result<String> {
    let digest = match algorithm {
        HashAlgorithm::Sha1 => {
            let mut mac = Hmac::<Sha1>::new_from_slice(key).map_err(mac_key_error)?;
            mac.update(message);
            hex::encode(mac.finalize().into_bytes())
        },
        HashAlgorithm::Sha256 => {
            let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(mac_key_error)?;
            mac.update(message);
            hex::encode(mac.finalize().into_bytes())
        },
        HashAlgorithm::Sha384 => {
            let mut mac = Hmac::<Sha384>::new_from_slice(key).map_err(mac_key_error)?;
            mac.update(message);
            hex::encode(mac.finalize().into_bytes())
        },
        HashAlgorithm::Sha512 => {
            let mut mac = Hmac::<Sha512>::new_from_slice(key).map_err(mac_key_error)?;
            mac.update(message);
            hex::encode(mac.finalize().into_bytes())
        },
    };
    Ok(digest)
}

fn mac_key_error(error: hmac::digest::InvalidLength) -> ProxyError {
    ProxyError::internal(format!("cannot key mac: {error}"))
}

/// SHA-256 of `data` as lowercase hex.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Timing-safe equality over byte strings of arbitrary length.
///
/// Draws a fresh 32-byte secret per comparison, MACs both inputs under it,
/// and compares the resulting fixed-length tags in constant time. Runtime
/// therefore depends on input lengths only, never on where the first
/// differing byte sits.
#[must_use]
pub fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    let mut key = [0u8; 32];
    OsRng.fill_bytes(&mut key);

    let (Ok(mut left_mac), Ok(mut right_mac)) = (
        Hmac::<Sha256>::new_from_slice(&key),
        Hmac::<Sha256>::new_from_slice(&key),
    ) else {
        return false;
    };

    left_mac.update(left);
    right_mac.update(right);

    let left_tag = left_mac.finalize().into_bytes();
    let right_tag = right_mac.finalize().into_bytes();

    left_tag.as_slice().ct_eq(right_tag.as_slice()).into()
}
