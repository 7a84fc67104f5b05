//! Hashing utilities for integrity verification.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::str::FromStr;

/// Digest function used to fingerprint evidence and packages.
///
/// Stored next to every hash so the scheme can evolve without
/// invalidating previously recorded fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    /// Length of the hex-encoded digest.
    pub fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha256 => 64,
            HashAlgorithm::Sha512 => 128,
        }
    }

    /// Compute the hex digest of bytes with this algorithm.
    pub fn digest(&self, data: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha256 => sha256_bytes(data),
            HashAlgorithm::Sha512 => {
                let mut hasher = Sha512::new();
                hasher.update(data);
                hex::encode(hasher.finalize())
            }
        }
    }

    /// Digest over an ordered sequence of parts.
    ///
    /// Parts are fed to the hasher back to back with no separator, so the
    /// result equals `digest(parts.concat())`.
    pub fn digest_parts<I, P>(&self, parts: I) -> String
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        match self {
            HashAlgorithm::Sha256 => {
                let mut hasher = Sha256::new();
                for part in parts {
                    hasher.update(part.as_ref());
                }
                hex::encode(hasher.finalize())
            }
            HashAlgorithm::Sha512 => {
                let mut hasher = Sha512::new();
                for part in parts {
                    hasher.update(part.as_ref());
                }
                hex::encode(hasher.finalize())
            }
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "").as_str() {
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            _ => Err(crate::Error::InvalidArgument(format!(
                "unsupported hash algorithm: {}",
                s
            ))),
        }
    }
}

/// Compute SHA256 hash of bytes.
pub fn sha256_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute SHA256 hash of a string.
pub fn sha256_str(s: &str) -> String {
    sha256_bytes(s.as_bytes())
}

/// RFC 8785 (JCS) canonical form of a JSON value: sorted keys, compact
/// separators and ECMAScript number formatting, so `1` and `1.0` agree.
pub fn canonical_json(value: &Value) -> Vec<u8> {
    // A `Value` holds only string keys and finite numbers, the two inputs
    // JCS serialization can reject.
    serde_jcs::to_vec(value).unwrap_or_else(|_| value.to_string().into_bytes())
}
