//! Optimistic mutation coordination.
//!
//! Every remote write runs the same protocol: cancel in-flight fetches
//! for the affected keys, snapshot them, apply the expected
//! post-mutation value to the cache, await the remote call, roll back
//! the snapshots verbatim on failure, and invalidate the affected keys
//! on every settlement so the next read pulls authoritative state.
//!
//! Each invocation owns its snapshots. When mutations on one key
//! overlap, a rollback restores only what that invocation captured;
//! last-rollback-wins between overlapping failures is a documented
//! limitation, bounded by the settlement invalidation forcing a refetch.

use std::sync::Arc;
use tracing::debug;

use forgecred_client::{RemoteDataSource, TxReceipt};
use forgecred_core::{AccountId, Credential, CredentialId, CredentialMetadata, CredentialPatch};

use crate::entry::CacheSnapshot;
use crate::key::{credential_key, credentials_key, CacheKey};
use crate::query::{CacheResult, QueryCache};

/// Phase of a single mutation invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    /// Not yet started.
    Idle,
    /// Optimistic state applied, remote call outstanding.
    Mutating,
    /// Remote call succeeded; reconciliation pending.
    Succeeded,
    /// Remote call failed; rollback applied, reconciliation pending.
    Failed,
    /// Affected keys invalidated; the invocation is complete.
    Settled,
}

/// Tracks one mutation's snapshots and drives it through the phases.
///
/// `begin` cancels in-flight fetches and captures snapshots for every
/// affected key before any optimistic write happens, so rollback always
/// restores true pre-mutation state.
struct MutationGuard<'a> {
    cache: &'a QueryCache,
    keys: Vec<CacheKey>,
    snapshots: Vec<CacheSnapshot>,
    phase: MutationPhase,
}

impl<'a> MutationGuard<'a> {
    fn begin(cache: &'a QueryCache, keys: Vec<CacheKey>) -> Self {
        let mut snapshots = Vec::with_capacity(keys.len());
        for key in &keys {
            cache.cancel(key);
            snapshots.push(cache.snapshot(key));
        }
        Self {
            cache,
            keys,
            snapshots,
            phase: MutationPhase::Mutating,
        }
    }

    /// Restore every snapshot verbatim, in capture order.
    fn fail(&mut self) {
        debug_assert_eq!(self.phase, MutationPhase::Mutating);
        for snapshot in self.snapshots.drain(..) {
            self.cache.restore(snapshot);
        }
        self.phase = MutationPhase::Failed;
    }

    fn succeed(&mut self) {
        debug_assert_eq!(self.phase, MutationPhase::Mutating);
        self.phase = MutationPhase::Succeeded;
    }

    /// Invalidate the affected keys so the next read refetches
    /// authoritative state, superseding both the optimistic guess and
    /// any rollback snapshot. Runs on success and failure alike.
    fn settle(&mut self) {
        debug_assert!(matches!(
            self.phase,
            MutationPhase::Succeeded | MutationPhase::Failed
        ));
        for key in &self.keys {
            self.cache.invalidate(key);
        }
        self.phase = MutationPhase::Settled;
    }
}

/// Coordinates optimistic writes against the cache and a remote source.
pub struct MutationCoordinator<S: RemoteDataSource> {
    cache: Arc<QueryCache>,
    source: Arc<S>,
}

impl<S: RemoteDataSource> MutationCoordinator<S> {
    /// Create a coordinator over a cache and remote source.
    pub fn new(cache: Arc<QueryCache>, source: Arc<S>) -> Self {
        Self { cache, source }
    }

    /// The cache this coordinator mutates.
    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Mint a credential, optimistically prepending a placeholder record
    /// (temporary id) to the owner's cached list.
    pub async fn mint(
        &self,
        owner: &AccountId,
        metadata: CredentialMetadata,
    ) -> CacheResult<TxReceipt> {
        let list_key = credentials_key(owner);
        let mut guard = MutationGuard::begin(&self.cache, vec![list_key.clone()]);

        let placeholder = Credential::placeholder(owner.clone(), &metadata);
        debug!(owner = %owner, temp_id = %placeholder.id, "optimistic mint");
        self.cache
            .write_with::<Vec<Credential>, _>(&list_key, |current| {
                let mut list = current.unwrap_or_default();
                list.insert(0, placeholder);
                list
            })?;

        let result = self.source.mint_credential(owner, metadata).await;
        match &result {
            Ok(receipt) => {
                debug!(id = %receipt.credential_id, "mint settled");
                guard.succeed();
            }
            Err(error) => {
                debug!(%error, "mint failed; rolling back");
                guard.fail();
            }
        }
        guard.settle();
        Ok(result?)
    }

    /// Update a credential's mutable fields, optimistically merging the
    /// patch into the cached list and single-record entries.
    pub async fn update(
        &self,
        owner: &AccountId,
        id: &CredentialId,
        patch: CredentialPatch,
    ) -> CacheResult<TxReceipt> {
        let list_key = credentials_key(owner);
        let record_key = credential_key(id);
        let mut guard =
            MutationGuard::begin(&self.cache, vec![list_key.clone(), record_key.clone()]);

        debug!(%id, "optimistic update");
        let list_patch = patch.clone();
        let target = id.clone();
        self.cache
            .update_if_present::<Vec<Credential>, _>(&list_key, move |mut list| {
                for credential in list.iter_mut().filter(|c| c.id == target) {
                    list_patch.apply(credential);
                }
                list
            })?;
        let record_patch = patch.clone();
        self.cache
            .update_if_present::<Credential, _>(&record_key, move |mut credential| {
                record_patch.apply(&mut credential);
                credential
            })?;

        let result = self.source.update_credential(owner, id, patch).await;
        match &result {
            Ok(_) => guard.succeed(),
            Err(error) => {
                debug!(%id, %error, "update failed; rolling back");
                guard.fail();
            }
        }
        guard.settle();
        Ok(result?)
    }

    /// Delete a credential, optimistically dropping it from the cached
    /// list and removing its single-record entry.
    pub async fn delete(&self, owner: &AccountId, id: &CredentialId) -> CacheResult<TxReceipt> {
        let list_key = credentials_key(owner);
        let record_key = credential_key(id);
        let mut guard =
            MutationGuard::begin(&self.cache, vec![list_key.clone(), record_key.clone()]);

        debug!(%id, "optimistic delete");
        let target = id.clone();
        self.cache
            .update_if_present::<Vec<Credential>, _>(&list_key, move |mut list| {
                list.retain(|credential| credential.id != target);
                list
            })?;
        self.cache.remove(&record_key);

        let result = self.source.delete_credential(owner, id).await;
        match &result {
            Ok(_) => guard.succeed(),
            Err(error) => {
                debug!(%id, %error, "delete failed; rolling back");
                guard.fail();
            }
        }
        guard.settle();
        Ok(result?)
    }
}
