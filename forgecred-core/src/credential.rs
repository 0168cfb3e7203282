//! Credential entity types and boundary validation.
//!
//! Credentials are soulbound: permanently bound to the minting account
//! with no transfer operation anywhere in the API. Identity is
//! content-addressable (hash of canonical metadata), so a real id is not
//! known until a mint settles; optimistic local records carry a
//! `temp-`-prefixed placeholder id that cannot collide with real ids.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{SourceError, SourceResult};
use crate::compute_content_hash;

/// Maximum serialized metadata size accepted by the chain, in bytes.
pub const MAX_METADATA_BYTES: usize = 4096;

/// Maximum number of credentials a single account may own.
pub const MAX_CREDENTIALS_PER_OWNER: usize = 500;

/// Minimum allowed review rating.
pub const MIN_RATING: u8 = 1;

/// Maximum allowed review rating.
pub const MAX_RATING: u8 = 5;

/// Prefix carried by temporary (optimistic) credential ids.
const TEMP_ID_PREFIX: &str = "temp-";

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Account identity on the credential chain (an opaque address string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Create an account id from an address string.
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    /// The underlying address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(address: &str) -> Self {
        Self(address.to_string())
    }
}

/// Credential identity.
///
/// Real ids are assigned by the remote store as the hex hash of the
/// credential's canonical metadata. Temporary ids are minted locally for
/// optimistic records and are recognizable by their `temp-` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialId(String);

impl CredentialId {
    /// Derive the real, content-addressable id for canonical metadata bytes.
    pub fn from_metadata_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(compute_content_hash(bytes)))
    }

    /// Mint a fresh temporary id for an optimistic local record.
    pub fn temporary() -> Self {
        Self(format!("{TEMP_ID_PREFIX}{}", Uuid::now_v7()))
    }

    /// Whether this id is a local placeholder awaiting mint settlement.
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }

    /// The underlying id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CredentialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CredentialId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

// ============================================================================
// ENUMS
// ============================================================================

/// Category of a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    /// A skill the owner claims (counted distinctly for scoring).
    Skill,
    /// A client review, carrying a 1-5 rating.
    Review,
    /// A completed payment record.
    Payment,
    /// A formal certification.
    Certification,
}

/// Who can see a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Public,
    Private,
}

// ============================================================================
// ENTITIES
// ============================================================================

/// A credential record as served by the remote store.
///
/// Immutable once minted except for `visibility` and `proof_hash`, the
/// only fields [`CredentialPatch`] can touch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Content-addressable id (or a temporary placeholder).
    pub id: CredentialId,
    /// The account this credential is soulbound to.
    pub owner: AccountId,
    /// Credential category.
    pub credential_type: CredentialType,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Who issued the credential.
    pub issuer: String,
    /// Review rating in `1..=5`, present for reviews.
    pub rating: Option<u8>,
    /// When the credential was minted.
    pub timestamp: DateTime<Utc>,
    /// Visibility setting (updatable).
    pub visibility: Visibility,
    /// Optional proof document hash (updatable).
    pub proof_hash: Option<String>,
}

impl Credential {
    /// Build the credential a successful mint of `metadata` would produce.
    pub fn from_metadata(
        id: CredentialId,
        owner: AccountId,
        metadata: &CredentialMetadata,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner,
            credential_type: metadata.credential_type,
            name: metadata.name.clone(),
            description: metadata.description.clone(),
            issuer: metadata.issuer.clone(),
            rating: metadata.rating,
            timestamp,
            visibility: metadata.visibility,
            proof_hash: metadata.proof_hash.clone(),
        }
    }

    /// Build an optimistic local record with a temporary id.
    pub fn placeholder(owner: AccountId, metadata: &CredentialMetadata) -> Self {
        Self::from_metadata(CredentialId::temporary(), owner, metadata, Utc::now())
    }
}

/// Mint payload, validated at the remote-source boundary before any
/// derived data may enter the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialMetadata {
    /// Credential category.
    pub credential_type: CredentialType,
    /// Display name (required, non-empty).
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Who issued the credential (required, non-empty).
    pub issuer: String,
    /// Review rating in `1..=5`.
    pub rating: Option<u8>,
    /// Initial visibility.
    pub visibility: Visibility,
    /// Optional proof document hash.
    pub proof_hash: Option<String>,
}

impl CredentialMetadata {
    /// Canonical serialized form, used for size checks and id derivation.
    pub fn canonical_bytes(&self) -> SourceResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| SourceError::validation(e.to_string()))
    }

    /// Validate the payload against chain constraints.
    ///
    /// Returns the canonical bytes on success so callers hash exactly
    /// what was size-checked.
    pub fn validate(&self) -> SourceResult<Vec<u8>> {
        if self.name.trim().is_empty() {
            return Err(SourceError::validation("credential name is required"));
        }
        if self.issuer.trim().is_empty() {
            return Err(SourceError::validation("credential issuer is required"));
        }
        if let Some(rating) = self.rating {
            if !(MIN_RATING..=MAX_RATING).contains(&rating) {
                return Err(SourceError::validation(format!(
                    "rating {rating} outside {MIN_RATING}..={MAX_RATING}"
                )));
            }
        }
        let bytes = self.canonical_bytes()?;
        if bytes.len() > MAX_METADATA_BYTES {
            return Err(SourceError::MetadataTooLarge {
                size: bytes.len(),
                max: MAX_METADATA_BYTES,
            });
        }
        Ok(bytes)
    }
}

/// Partial update for a credential.
///
/// Only visibility and proof hash are updatable in place; everything
/// else is fixed at mint time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialPatch {
    /// New visibility, if changing.
    pub visibility: Option<Visibility>,
    /// New proof hash, if changing.
    pub proof_hash: Option<String>,
}

impl CredentialPatch {
    /// True when the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.visibility.is_none() && self.proof_hash.is_none()
    }

    /// Reject patches that change nothing.
    pub fn validate(&self) -> SourceResult<()> {
        if self.is_empty() {
            return Err(SourceError::validation("update patch is empty"));
        }
        Ok(())
    }

    /// Merge the changed fields into an existing record.
    pub fn apply(&self, credential: &mut Credential) {
        if let Some(visibility) = self.visibility {
            credential.visibility = visibility;
        }
        if let Some(proof_hash) = &self.proof_hash {
            credential.proof_hash = Some(proof_hash.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill_metadata(name: &str) -> CredentialMetadata {
        CredentialMetadata {
            credential_type: CredentialType::Skill,
            name: name.to_string(),
            description: "a skill".to_string(),
            issuer: "self".to_string(),
            rating: None,
            visibility: Visibility::Public,
            proof_hash: None,
        }
    }

    #[test]
    fn temporary_ids_are_recognizable_and_unique() {
        let a = CredentialId::temporary();
        let b = CredentialId::temporary();
        assert!(a.is_temporary());
        assert!(b.is_temporary());
        assert_ne!(a, b);
    }

    #[test]
    fn real_ids_are_derived_from_metadata_content() {
        let bytes = skill_metadata("Rust").validate().unwrap();
        let a = CredentialId::from_metadata_bytes(&bytes);
        let b = CredentialId::from_metadata_bytes(&bytes);
        assert_eq!(a, b);
        assert!(!a.is_temporary());

        let other = skill_metadata("Go").validate().unwrap();
        assert_ne!(a, CredentialId::from_metadata_bytes(&other));
    }

    #[test]
    fn validate_rejects_blank_name_and_issuer() {
        let mut metadata = skill_metadata("  ");
        assert!(matches!(
            metadata.validate(),
            Err(SourceError::Validation { .. })
        ));

        metadata.name = "Rust".to_string();
        metadata.issuer = String::new();
        assert!(matches!(
            metadata.validate(),
            Err(SourceError::Validation { .. })
        ));
    }

    #[test]
    fn validate_rejects_out_of_range_rating() {
        let mut metadata = skill_metadata("Review");
        metadata.credential_type = CredentialType::Review;
        metadata.rating = Some(0);
        assert!(matches!(
            metadata.validate(),
            Err(SourceError::Validation { .. })
        ));

        metadata.rating = Some(6);
        assert!(matches!(
            metadata.validate(),
            Err(SourceError::Validation { .. })
        ));

        metadata.rating = Some(5);
        assert!(metadata.validate().is_ok());
    }

    #[test]
    fn validate_rejects_oversized_metadata() {
        let mut metadata = skill_metadata("Large");
        metadata.description = "x".repeat(MAX_METADATA_BYTES + 1);
        match metadata.validate() {
            Err(SourceError::MetadataTooLarge { size, max }) => {
                assert!(size > max);
                assert_eq!(max, MAX_METADATA_BYTES);
            }
            other => panic!("expected MetadataTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn patch_merges_only_updatable_fields() {
        let metadata = skill_metadata("Rust");
        let mut credential =
            Credential::placeholder(AccountId::from("5Alice"), &metadata);
        let before_name = credential.name.clone();

        let patch = CredentialPatch {
            visibility: Some(Visibility::Private),
            proof_hash: Some("deadbeef".to_string()),
        };
        patch.apply(&mut credential);

        assert_eq!(credential.visibility, Visibility::Private);
        assert_eq!(credential.proof_hash.as_deref(), Some("deadbeef"));
        assert_eq!(credential.name, before_name);
    }

    #[test]
    fn empty_patch_is_rejected() {
        assert!(matches!(
            CredentialPatch::default().validate(),
            Err(SourceError::Validation { .. })
        ));
    }
}
