//! Structured cache keys.
//!
//! A key is an ordered tuple of string segments compared structurally:
//! two keys address the same entry iff every segment matches by value
//! and position. Prefix matching drives bulk invalidation, so
//! invalidating `["credentials"]` covers every owner-scoped list.

use serde::{Deserialize, Serialize};
use std::fmt;

use forgecred_core::{AccountId, CredentialId};

/// Ordered tuple identifying a cached resource.
///
/// Keys are opaque to callers: they are only ever compared for equality
/// or prefix containment, never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(Vec<String>);

impl CacheKey {
    /// Build a key from ordered segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// The ordered segments.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Whether this key falls under `prefix` (segment-wise).
    ///
    /// Every key is under its own prefix.
    pub fn starts_with(&self, prefix: &CacheKey) -> bool {
        self.0.len() >= prefix.0.len()
            && self.0.iter().zip(prefix.0.iter()).all(|(a, b)| a == b)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Key for an owner's credential list.
pub fn credentials_key(owner: &AccountId) -> CacheKey {
    CacheKey::new(["credentials", owner.as_str()])
}

/// Prefix covering every owner's credential list.
pub fn all_credentials_key() -> CacheKey {
    CacheKey::new(["credentials"])
}

/// Key for a single credential record.
pub fn credential_key(id: &CredentialId) -> CacheKey {
    CacheKey::new(["credential", id.as_str()])
}

/// Key for chain network information.
pub fn network_info_key() -> CacheKey {
    CacheKey::new(["network-info"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_structural() {
        let a = CacheKey::new(["credentials", "5Alice"]);
        let b = credentials_key(&AccountId::from("5Alice"));
        assert_eq!(a, b);
        assert_ne!(a, CacheKey::new(["credentials", "5Bob"]));
        assert_ne!(a, CacheKey::new(["5Alice", "credentials"]));
    }

    #[test]
    fn prefix_matching_is_segment_wise() {
        let owner_list = credentials_key(&AccountId::from("5Alice"));
        assert!(owner_list.starts_with(&all_credentials_key()));
        assert!(owner_list.starts_with(&owner_list));
        assert!(!all_credentials_key().starts_with(&owner_list));

        // Prefixing matches whole segments, not string prefixes.
        let cred = CacheKey::new(["credential", "abc"]);
        assert!(!cred.starts_with(&all_credentials_key()));
    }

    #[test]
    fn display_joins_segments() {
        assert_eq!(network_info_key().to_string(), "network-info");
        assert_eq!(
            credentials_key(&AccountId::from("5Alice")).to_string(),
            "credentials/5Alice"
        );
    }
}
