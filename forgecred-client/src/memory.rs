//! In-memory credential store.
//!
//! Reference implementation of [`RemoteDataSource`] with the same
//! semantics as the on-chain pallet: ids are content hashes of the
//! canonical metadata, duplicate metadata cannot be minted twice (by
//! anyone), metadata is capped at 4 KiB, each owner holds at most 500
//! credentials, and update/delete verify ownership. Failure injection
//! lets cache tests exercise error and retry paths deterministically.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

use forgecred_core::{
    AccountId, Credential, CredentialId, CredentialMetadata, CredentialPatch, SourceError,
    SourceResult, MAX_CREDENTIALS_PER_OWNER,
};

use crate::source::{NetworkInfo, RemoteDataSource, TxReceipt};

#[derive(Default)]
struct StoreInner {
    credentials: HashMap<CredentialId, Credential>,
    by_owner: HashMap<AccountId, Vec<CredentialId>>,
    // Errors queued by tests; consumed one per operation, FIFO.
    queued_failures: Vec<SourceError>,
    fetch_count: u64,
}

/// In-memory [`RemoteDataSource`] with pallet semantics.
pub struct InMemoryCredentialStore {
    inner: RwLock<StoreInner>,
    network: NetworkInfo,
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            network: NetworkInfo {
                chain: "forgecred-dev".to_string(),
                spec_version: 1,
            },
        }
    }

    /// Queue an error to be returned by the next operation.
    ///
    /// Repeated calls queue multiple failures, consumed FIFO; useful for
    /// driving the cache's retry path.
    pub fn fail_next(&self, error: SourceError) {
        self.inner
            .write()
            .expect("store lock poisoned")
            .queued_failures
            .push(error);
    }

    /// Queue `count` copies of an error.
    pub fn fail_times(&self, error: SourceError, count: usize) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        for _ in 0..count {
            inner.queued_failures.push(error.clone());
        }
    }

    /// Number of fetch operations served (for deduplication assertions).
    pub fn fetch_count(&self) -> u64 {
        self.inner.read().expect("store lock poisoned").fetch_count
    }

    fn take_queued_failure(inner: &mut StoreInner) -> Option<SourceError> {
        if inner.queued_failures.is_empty() {
            None
        } else {
            Some(inner.queued_failures.remove(0))
        }
    }
}

#[async_trait]
impl RemoteDataSource for InMemoryCredentialStore {
    async fn fetch_credentials(&self, owner: &AccountId) -> SourceResult<Vec<Credential>> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        if let Some(err) = Self::take_queued_failure(&mut inner) {
            return Err(err);
        }
        inner.fetch_count += 1;
        let ids = inner.by_owner.get(owner).cloned().unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| inner.credentials.get(id).cloned())
            .collect())
    }

    async fn fetch_credential_by_id(&self, id: &CredentialId) -> SourceResult<Option<Credential>> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        if let Some(err) = Self::take_queued_failure(&mut inner) {
            return Err(err);
        }
        inner.fetch_count += 1;
        Ok(inner.credentials.get(id).cloned())
    }

    async fn mint_credential(
        &self,
        owner: &AccountId,
        metadata: CredentialMetadata,
    ) -> SourceResult<TxReceipt> {
        let bytes = metadata.validate()?;
        let id = CredentialId::from_metadata_bytes(&bytes);

        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        if let Some(err) = Self::take_queued_failure(&mut inner) {
            return Err(err);
        }

        if inner.credentials.contains_key(&id) {
            return Err(SourceError::CredentialAlreadyExists { id });
        }
        let owned = inner.by_owner.entry(owner.clone()).or_default();
        if owned.len() >= MAX_CREDENTIALS_PER_OWNER {
            return Err(SourceError::TooManyCredentials {
                max: MAX_CREDENTIALS_PER_OWNER,
            });
        }
        owned.push(id.clone());

        let credential = Credential::from_metadata(id.clone(), owner.clone(), &metadata, Utc::now());
        inner.credentials.insert(id.clone(), credential);
        debug!(%id, %owner, "minted credential");

        Ok(TxReceipt {
            credential_id: id,
            owner: owner.clone(),
        })
    }

    async fn update_credential(
        &self,
        owner: &AccountId,
        id: &CredentialId,
        patch: CredentialPatch,
    ) -> SourceResult<TxReceipt> {
        patch.validate()?;

        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        if let Some(err) = Self::take_queued_failure(&mut inner) {
            return Err(err);
        }

        let credential = inner
            .credentials
            .get_mut(id)
            .ok_or_else(|| SourceError::CredentialNotFound { id: id.clone() })?;
        if credential.owner != *owner {
            return Err(SourceError::NotCredentialOwner { id: id.clone() });
        }
        patch.apply(credential);
        debug!(%id, %owner, "updated credential");

        Ok(TxReceipt {
            credential_id: id.clone(),
            owner: owner.clone(),
        })
    }

    async fn delete_credential(
        &self,
        owner: &AccountId,
        id: &CredentialId,
    ) -> SourceResult<TxReceipt> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        if let Some(err) = Self::take_queued_failure(&mut inner) {
            return Err(err);
        }

        let credential = inner
            .credentials
            .get(id)
            .ok_or_else(|| SourceError::CredentialNotFound { id: id.clone() })?;
        if credential.owner != *owner {
            return Err(SourceError::NotCredentialOwner { id: id.clone() });
        }
        inner.credentials.remove(id);
        if let Some(owned) = inner.by_owner.get_mut(owner) {
            owned.retain(|owned_id| owned_id != id);
        }
        debug!(%id, %owner, "deleted credential");

        Ok(TxReceipt {
            credential_id: id.clone(),
            owner: owner.clone(),
        })
    }

    async fn network_info(&self) -> SourceResult<NetworkInfo> {
        let mut inner = self.inner.write().map_err(|_| poisoned())?;
        if let Some(err) = Self::take_queued_failure(&mut inner) {
            return Err(err);
        }
        inner.fetch_count += 1;
        Ok(self.network.clone())
    }
}

fn poisoned() -> SourceError {
    SourceError::network("store lock poisoned")
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgecred_core::{CredentialType, Visibility};

    fn metadata(name: &str) -> CredentialMetadata {
        CredentialMetadata {
            credential_type: CredentialType::Skill,
            name: name.to_string(),
            description: "desc".to_string(),
            issuer: "issuer".to_string(),
            rating: None,
            visibility: Visibility::Public,
            proof_hash: None,
        }
    }

    fn alice() -> AccountId {
        AccountId::from("5Alice")
    }

    fn bob() -> AccountId {
        AccountId::from("5Bob")
    }

    #[tokio::test]
    async fn mint_then_fetch_round_trips() {
        let store = InMemoryCredentialStore::new();
        let receipt = store
            .mint_credential(&alice(), metadata("Rust"))
            .await
            .unwrap();
        assert!(!receipt.credential_id.is_temporary());

        let owned = store.fetch_credentials(&alice()).await.unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].id, receipt.credential_id);
        assert_eq!(owned[0].name, "Rust");

        let by_id = store
            .fetch_credential_by_id(&receipt.credential_id)
            .await
            .unwrap();
        assert!(by_id.is_some());
    }

    #[tokio::test]
    async fn duplicate_metadata_cannot_be_minted_by_anyone() {
        let store = InMemoryCredentialStore::new();
        store
            .mint_credential(&alice(), metadata("Rust"))
            .await
            .unwrap();

        let same_by_owner = store.mint_credential(&alice(), metadata("Rust")).await;
        assert!(matches!(
            same_by_owner,
            Err(SourceError::CredentialAlreadyExists { .. })
        ));

        let same_by_other = store.mint_credential(&bob(), metadata("Rust")).await;
        assert!(matches!(
            same_by_other,
            Err(SourceError::CredentialAlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn per_owner_cap_is_enforced() {
        let store = InMemoryCredentialStore::new();
        for i in 0..MAX_CREDENTIALS_PER_OWNER {
            store
                .mint_credential(&alice(), metadata(&format!("skill-{i}")))
                .await
                .unwrap();
        }
        let over_cap = store.mint_credential(&alice(), metadata("one-more")).await;
        assert!(matches!(
            over_cap,
            Err(SourceError::TooManyCredentials { .. })
        ));
    }

    #[tokio::test]
    async fn update_requires_ownership() {
        let store = InMemoryCredentialStore::new();
        let receipt = store
            .mint_credential(&alice(), metadata("Rust"))
            .await
            .unwrap();

        let patch = CredentialPatch {
            visibility: Some(Visibility::Private),
            proof_hash: None,
        };
        let as_bob = store
            .update_credential(&bob(), &receipt.credential_id, patch.clone())
            .await;
        assert!(matches!(as_bob, Err(SourceError::NotCredentialOwner { .. })));

        store
            .update_credential(&alice(), &receipt.credential_id, patch)
            .await
            .unwrap();
        let updated = store
            .fetch_credential_by_id(&receipt.credential_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.visibility, Visibility::Private);
    }

    #[tokio::test]
    async fn update_missing_credential_fails() {
        let store = InMemoryCredentialStore::new();
        let patch = CredentialPatch {
            visibility: Some(Visibility::Private),
            proof_hash: None,
        };
        let result = store
            .update_credential(&alice(), &CredentialId::from("missing"), patch)
            .await;
        assert!(matches!(result, Err(SourceError::CredentialNotFound { .. })));
    }

    #[tokio::test]
    async fn delete_removes_record_and_owner_index_entry() {
        let store = InMemoryCredentialStore::new();
        let receipt = store
            .mint_credential(&alice(), metadata("Rust"))
            .await
            .unwrap();

        let as_bob = store.delete_credential(&bob(), &receipt.credential_id).await;
        assert!(matches!(as_bob, Err(SourceError::NotCredentialOwner { .. })));

        store
            .delete_credential(&alice(), &receipt.credential_id)
            .await
            .unwrap();
        assert!(store
            .fetch_credential_by_id(&receipt.credential_id)
            .await
            .unwrap()
            .is_none());
        assert!(store.fetch_credentials(&alice()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn queued_failures_are_consumed_in_order() {
        let store = InMemoryCredentialStore::new();
        store.fail_times(SourceError::network("down"), 2);

        assert!(store.fetch_credentials(&alice()).await.is_err());
        assert!(store.fetch_credentials(&alice()).await.is_err());
        assert!(store.fetch_credentials(&alice()).await.is_ok());
        assert_eq!(store.fetch_count(), 1);
    }
}
