//! Content fingerprinting for change detection.
//!
//! A fingerprint is the SHA-256 of a document's canonical rendering (see
//! [`crate::canonical_json`]). The change gate compares the stored
//! fingerprint against a freshly computed one; equal fingerprints
//! short-circuit the whole pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

use crate::canonical_json;

/// A SHA-256 content fingerprint, stored as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of a parsed document.
    ///
    /// Hashes the canonical rendering of `model`. If canonicalization
    /// fails, falls back to hashing `raw` verbatim; the degradation is
    /// logged because raw-byte hashing reintroduces formatting noise
    /// into change detection.
    #[must_use]
    pub fn compute(model: &Value, raw: &[u8]) -> Self {
        match canonical_json::to_canonical_bytes(model) {
            Ok(canonical) => Self::of_bytes(&canonical),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "canonical rendering failed, fingerprinting raw bytes instead"
                );
                Self::of_bytes(raw)
            }
        }
    }

    /// Computes the fingerprint of arbitrary bytes.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    /// Returns the lowercase hex digest.
    #[must_use]
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
