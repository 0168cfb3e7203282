//! Remote data source abstraction.
//!
//! The cache layer works against this trait, never a concrete client,
//! so tests can substitute the in-memory store and production can wire
//! an RPC-backed implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use forgecred_core::{
    AccountId, Credential, CredentialId, CredentialMetadata, CredentialPatch, SourceResult,
};

/// Receipt of a settled write transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// The credential the transaction targeted. For mints this is the
    /// real, content-addressable id assigned by the store.
    pub credential_id: CredentialId,
    /// The account that signed the transaction.
    pub owner: AccountId,
}

/// Descriptive information about the connected chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// Human-readable chain name.
    pub chain: String,
    /// Runtime spec version.
    pub spec_version: u32,
}

/// Async operations against the credential store.
///
/// All operations may fail with the categorized errors of
/// [`forgecred_core::SourceError`]; only network failures are
/// retryable. Implementations validate payloads at this boundary so
/// malformed data never reaches the cache.
#[async_trait]
pub trait RemoteDataSource: Send + Sync {
    /// Fetch every credential owned by an account.
    async fn fetch_credentials(&self, owner: &AccountId) -> SourceResult<Vec<Credential>>;

    /// Fetch a single credential by id, if it exists.
    async fn fetch_credential_by_id(&self, id: &CredentialId) -> SourceResult<Option<Credential>>;

    /// Mint a new soulbound credential for `owner`.
    async fn mint_credential(
        &self,
        owner: &AccountId,
        metadata: CredentialMetadata,
    ) -> SourceResult<TxReceipt>;

    /// Update the mutable fields of an owned credential.
    async fn update_credential(
        &self,
        owner: &AccountId,
        id: &CredentialId,
        patch: CredentialPatch,
    ) -> SourceResult<TxReceipt>;

    /// Delete an owned credential. Irreversible.
    async fn delete_credential(&self, owner: &AccountId, id: &CredentialId)
        -> SourceResult<TxReceipt>;

    /// Describe the connected chain.
    async fn network_info(&self) -> SourceResult<NetworkInfo>;
}
