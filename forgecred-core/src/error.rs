//! Error taxonomy for remote credential operations.
//!
//! The variants mirror the pallet's dispatch errors plus the two
//! client-side categories (network, validation). Retryability is a
//! property of the variant: only transient network failures may be
//! retried by the cache layer.

use thiserror::Error;

use crate::credential::CredentialId;

/// Errors surfaced by the remote data source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    /// Transient transport failure. The only retryable category.
    #[error("network error: {reason}")]
    Network { reason: String },

    /// Caller input rejected before reaching the chain.
    #[error("validation error: {reason}")]
    Validation { reason: String },

    /// A credential with the same metadata hash already exists.
    #[error("credential already exists: {id}")]
    CredentialAlreadyExists { id: CredentialId },

    /// Serialized metadata exceeds the on-chain size limit.
    #[error("metadata too large: {size} bytes (max {max})")]
    MetadataTooLarge { size: usize, max: usize },

    /// The owner has reached the per-account credential limit.
    #[error("too many credentials (max {max})")]
    TooManyCredentials { max: usize },

    /// The targeted credential does not exist.
    #[error("credential not found: {id}")]
    CredentialNotFound { id: CredentialId },

    /// The caller does not own the targeted credential.
    #[error("not credential owner: {id}")]
    NotCredentialOwner { id: CredentialId },
}

impl SourceError {
    /// Whether the cache layer may retry the failed operation.
    ///
    /// Validation and domain conflict errors are deterministic; retrying
    /// them would re-fail with the same result.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Convenience constructor for network failures.
    pub fn network(reason: impl Into<String>) -> Self {
        Self::Network {
            reason: reason.into(),
        }
    }

    /// Convenience constructor for validation failures.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }
}

/// Result alias for remote operations.
pub type SourceResult<T> = Result<T, SourceError>;
