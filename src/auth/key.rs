//! Cache key derivation for verified credentials.
//!
//! The key is a SHA-256 digest over the owner, repository and token so that
//! raw credentials never enter the cache key space.

use std::fmt;

use sha2::{Digest, Sha256};

/// Digest identifying one (owner, repo, token) triple.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct VerificationKey([u8; 32]);

impl VerificationKey {
    /// Derive the key for `token` scoped to `owner/repo`.
    ///
    /// Each field is length-prefixed before hashing, so moving bytes across a
    /// field boundary (`"orgA"/"repo"` vs `"org"/"Arepo"`) changes the digest.
    pub fn derive(owner: &str, repo: &str, token: &str) -> Self {
        let mut hasher = Sha256::new();
        for field in [owner, repo, token] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerificationKey({})", self.to_hex())
    }
}
