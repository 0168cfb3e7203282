//! ForgeCred Core - Credential Types
//!
//! Pure data structures and computations with no I/O. All other crates
//! depend on this. The types here mirror what the on-chain credential
//! pallet stores, after boundary validation.

use sha2::{Digest, Sha256};

pub mod credential;
pub mod error;
pub mod trust;

pub use credential::{
    AccountId, Credential, CredentialId, CredentialMetadata, CredentialPatch, CredentialType,
    Visibility, MAX_CREDENTIALS_PER_OWNER, MAX_METADATA_BYTES, MAX_RATING, MIN_RATING,
};
pub use error::{SourceError, SourceResult};
pub use trust::{compute_trust_score, ScoreMemo, TrustBreakdown, TrustScore, TrustTier};

/// Timestamp type using UTC timezone.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// SHA-256 content hash for deduplication and identity derivation.
pub type ContentHash = [u8; 32];

/// Compute SHA-256 hash of content.
///
/// Used both for content-addressable credential ids (the chain hashes
/// metadata to derive the id) and for memoization keys in [`ScoreMemo`].
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_deterministic() {
        let a = compute_content_hash(b"credential metadata");
        let b = compute_content_hash(b"credential metadata");
        assert_eq!(a, b);
        assert_ne!(a, compute_content_hash(b"other metadata"));
    }
}
