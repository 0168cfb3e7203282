//! End-to-end optimistic mutation flows.
//!
//! These tests park the remote call behind a gate so the optimistic
//! cache state is observable while the mutation is still in flight,
//! then release the gate and assert settlement behavior.

use std::sync::Arc;
use std::time::Duration;

use forgecred_cache::{
    credential_key, credentials_key, MutationCoordinator, QueryCache, ReadOptions,
};
use forgecred_client::{InMemoryCredentialStore, RemoteDataSource};
use forgecred_core::{compute_trust_score, AccountId, Credential, SourceError, TrustTier};
use forgecred_test_utils::{review_metadata, skill_metadata, GatedCredentialStore};

fn alice() -> AccountId {
    AccountId::from("5Alice")
}

/// Cache + coordinator over a gated store seeded with two skills.
async fn setup() -> (
    Arc<QueryCache>,
    MutationCoordinator<GatedCredentialStore>,
    Arc<GatedCredentialStore>,
    Arc<InMemoryCredentialStore>,
) {
    let store = Arc::new(InMemoryCredentialStore::new());
    store
        .mint_credential(&alice(), skill_metadata("Rust"))
        .await
        .unwrap();
    store
        .mint_credential(&alice(), skill_metadata("Go"))
        .await
        .unwrap();

    let gated = Arc::new(GatedCredentialStore::new(Arc::clone(&store)));
    let cache = Arc::new(QueryCache::new());
    let coordinator = MutationCoordinator::new(Arc::clone(&cache), Arc::clone(&gated));
    (cache, coordinator, gated, store)
}

async fn read_list(cache: &Arc<QueryCache>, gated: &Arc<GatedCredentialStore>) -> Vec<Credential> {
    let gated = Arc::clone(gated);
    let owner = alice();
    cache
        .read::<Vec<Credential>, _, _>(
            &credentials_key(&alice()),
            move || {
                let gated = Arc::clone(&gated);
                let owner = owner.clone();
                async move { gated.fetch_credentials(&owner).await }
            },
            ReadOptions::default(),
        )
        .await
        .unwrap()
        .unwrap()
        .into_value()
}

fn peek_list(cache: &Arc<QueryCache>) -> Option<Vec<Credential>> {
    cache
        .peek::<Vec<Credential>>(&credentials_key(&alice()))
        .unwrap()
        .map(|read| read.into_value())
}

#[tokio::test]
async fn mint_shows_placeholder_in_flight_and_reconciles_on_success() {
    let (cache, coordinator, gated, _store) = setup().await;
    let baseline = read_list(&cache, &gated).await;
    assert_eq!(baseline.len(), 2);

    gated.close_gate();
    let handle = tokio::spawn(async move {
        let receipt = coordinator.mint(&alice(), skill_metadata("Zig")).await;
        (coordinator, receipt)
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Mid-flight: the placeholder is prepended with a temporary id.
    let optimistic = peek_list(&cache).unwrap();
    assert_eq!(optimistic.len(), 3);
    assert!(optimistic[0].id.is_temporary());
    assert_eq!(optimistic[0].name, "Zig");

    gated.open_gate();
    let (_coordinator, receipt) = handle.await.unwrap();
    let receipt = receipt.unwrap();
    assert!(!receipt.credential_id.is_temporary());

    // Settlement invalidated the list; the next read pulls server truth
    // with the real content-addressable id.
    let reconciled = read_list(&cache, &gated).await;
    assert_eq!(reconciled.len(), 3);
    assert!(reconciled.iter().all(|c| !c.id.is_temporary()));
    assert!(reconciled.iter().any(|c| c.id == receipt.credential_id));
}

#[tokio::test]
async fn failed_mint_rolls_back_to_exact_pre_mutation_list() {
    let (cache, coordinator, gated, store) = setup().await;
    let baseline = read_list(&cache, &gated).await;

    store.fail_next(SourceError::network("rpc down"));
    gated.close_gate();
    let handle = tokio::spawn(async move {
        let result = coordinator.mint(&alice(), skill_metadata("Zig")).await;
        (coordinator, result)
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    let optimistic = peek_list(&cache).unwrap();
    assert_eq!(optimistic.len(), 3);

    gated.open_gate();
    let (_coordinator, result) = handle.await.unwrap();
    assert!(result.is_err());

    // Rollback restored the snapshot verbatim, placeholder gone.
    let restored = peek_list(&cache).unwrap();
    assert_eq!(restored, baseline);

    // And the refetch after settlement agrees with the store.
    let refetched = read_list(&cache, &gated).await;
    assert_eq!(refetched, baseline);
}

#[tokio::test]
async fn delete_drops_immediately_and_restores_on_failure() {
    let (cache, coordinator, gated, store) = setup().await;
    let baseline = read_list(&cache, &gated).await;
    let target = baseline[0].clone();
    cache.write(&credential_key(&target.id), &target).unwrap();

    store.fail_next(SourceError::network("rpc down"));
    gated.close_gate();
    let target_id = target.id.clone();
    let handle = tokio::spawn(async move {
        let result = coordinator.delete(&alice(), &target_id).await;
        (coordinator, result)
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Mid-flight: the record is gone from the list and its own entry.
    let optimistic = peek_list(&cache).unwrap();
    assert_eq!(optimistic.len(), 1);
    assert!(optimistic.iter().all(|c| c.id != target.id));
    assert!(cache
        .peek::<Credential>(&credential_key(&target.id))
        .unwrap()
        .is_none());

    gated.open_gate();
    let (coordinator, result) = handle.await.unwrap();
    assert!(result.is_err());

    // Both keys restored verbatim.
    assert_eq!(peek_list(&cache).unwrap(), baseline);
    let record = cache
        .peek::<Credential>(&credential_key(&target.id))
        .unwrap()
        .unwrap();
    assert_eq!(record.into_value(), target);

    // A second attempt without failure settles into server truth.
    coordinator.delete(&alice(), &target.id).await.unwrap();
    let remaining = read_list(&cache, &gated).await;
    assert_eq!(remaining.len(), 1);
    assert!(remaining.iter().all(|c| c.id != target.id));
}

#[tokio::test]
async fn trust_score_over_cached_list_tracks_mutations() {
    let (cache, coordinator, gated, store) = setup().await;
    store
        .mint_credential(&alice(), review_metadata("acme", 5))
        .await
        .unwrap();

    let list = read_list(&cache, &gated).await;
    let score = compute_trust_score(&list);
    // Two skills (20) and one five-star review ramped to 20:
    // (50*20 + 30*20) / 100 = 16, Bronze.
    assert_eq!(score.total, 16);
    assert_eq!(score.tier, TrustTier::Bronze);

    // Minting a third skill and refetching moves the skill component.
    coordinator
        .mint(&alice(), skill_metadata("Zig"))
        .await
        .unwrap();
    let list = read_list(&cache, &gated).await;
    assert_eq!(list.len(), 4);
    let score = compute_trust_score(&list);
    assert_eq!(score.breakdown.skill_score, 30);
    assert_eq!(score.total, 19);
}
