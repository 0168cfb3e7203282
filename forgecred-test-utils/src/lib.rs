//! ForgeCred Test Utilities
//!
//! Centralized test infrastructure for the ForgeCred workspace:
//! - Fixture constructors for metadata and credentials
//! - Proptest generators for credential collections
//! - A gated remote-source wrapper for observing optimistic cache state
//!   while a mutation is in flight

use async_trait::async_trait;
use chrono::Utc;
use proptest::prelude::*;
use std::sync::Arc;
use tokio::sync::watch;

use forgecred_client::{
    InMemoryCredentialStore, NetworkInfo, RemoteDataSource, TxReceipt,
};
use forgecred_core::{
    AccountId, Credential, CredentialId, CredentialMetadata, CredentialPatch, CredentialType,
    SourceResult, Visibility,
};

// ============================================================================
// FIXTURES
// ============================================================================

/// Metadata for a skill credential.
pub fn skill_metadata(name: &str) -> CredentialMetadata {
    CredentialMetadata {
        credential_type: CredentialType::Skill,
        name: name.to_string(),
        description: format!("{name} proficiency"),
        issuer: "self".to_string(),
        rating: None,
        visibility: Visibility::Public,
        proof_hash: None,
    }
}

/// Metadata for a client review with the given rating.
pub fn review_metadata(client: &str, rating: u8) -> CredentialMetadata {
    CredentialMetadata {
        credential_type: CredentialType::Review,
        name: format!("Review from {client}"),
        description: "project review".to_string(),
        issuer: client.to_string(),
        rating: Some(rating),
        visibility: Visibility::Public,
        proof_hash: None,
    }
}

/// Metadata for a payment record.
pub fn payment_metadata(reference: &str) -> CredentialMetadata {
    CredentialMetadata {
        credential_type: CredentialType::Payment,
        name: format!("Payment {reference}"),
        description: "completed payment".to_string(),
        issuer: "escrow".to_string(),
        rating: None,
        visibility: Visibility::Private,
        proof_hash: None,
    }
}

/// A credential record with a fresh temporary id.
pub fn make_credential(
    owner: &AccountId,
    credential_type: CredentialType,
    name: &str,
    rating: Option<u8>,
) -> Credential {
    Credential {
        id: CredentialId::temporary(),
        owner: owner.clone(),
        credential_type,
        name: name.to_string(),
        description: String::new(),
        issuer: "issuer".to_string(),
        rating,
        timestamp: Utc::now(),
        visibility: Visibility::Public,
        proof_hash: None,
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

/// Strategy over credential categories.
pub fn arb_credential_type() -> impl Strategy<Value = CredentialType> {
    prop_oneof![
        Just(CredentialType::Skill),
        Just(CredentialType::Review),
        Just(CredentialType::Payment),
        Just(CredentialType::Certification),
    ]
}

/// Strategy over valid mint metadata.
pub fn arb_metadata() -> impl Strategy<Value = CredentialMetadata> {
    (
        arb_credential_type(),
        "[a-zA-Z][a-zA-Z0-9 ]{0,24}",
        "[a-z ]{0,64}",
        "[a-zA-Z]{1,16}",
        proptest::option::of(1u8..=5),
        prop_oneof![Just(Visibility::Public), Just(Visibility::Private)],
    )
        .prop_map(
            |(credential_type, name, description, issuer, rating, visibility)| {
                CredentialMetadata {
                    credential_type,
                    name,
                    description,
                    issuer,
                    rating,
                    visibility,
                    proof_hash: None,
                }
            },
        )
}

/// Strategy over credential records owned by `owner`.
pub fn arb_credential(owner: AccountId) -> impl Strategy<Value = Credential> {
    arb_metadata().prop_map(move |metadata| Credential::placeholder(owner.clone(), &metadata))
}

// ============================================================================
// GATED STORE
// ============================================================================

/// Remote-source wrapper whose write operations park at a gate.
///
/// With the gate closed, a mutation's remote call suspends after the
/// optimistic cache write has been applied, letting tests assert the
/// in-flight state before releasing settlement. Reads pass through
/// ungated.
pub struct GatedCredentialStore {
    inner: Arc<InMemoryCredentialStore>,
    gate: watch::Sender<bool>,
}

impl GatedCredentialStore {
    /// Wrap a store with an open gate.
    pub fn new(inner: Arc<InMemoryCredentialStore>) -> Self {
        let (gate, _) = watch::channel(true);
        Self { inner, gate }
    }

    /// Park subsequent write operations until [`Self::open_gate`].
    pub fn close_gate(&self) {
        // send_replace updates the value even while no receiver exists;
        // waiters subscribe lazily in wait_for_gate.
        self.gate.send_replace(false);
    }

    /// Release parked write operations.
    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    /// The wrapped store, for seeding and failure injection.
    pub fn inner(&self) -> &Arc<InMemoryCredentialStore> {
        &self.inner
    }

    async fn wait_for_gate(&self) {
        let mut rx = self.gate.subscribe();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[async_trait]
impl RemoteDataSource for GatedCredentialStore {
    async fn fetch_credentials(&self, owner: &AccountId) -> SourceResult<Vec<Credential>> {
        self.inner.fetch_credentials(owner).await
    }

    async fn fetch_credential_by_id(&self, id: &CredentialId) -> SourceResult<Option<Credential>> {
        self.inner.fetch_credential_by_id(id).await
    }

    async fn mint_credential(
        &self,
        owner: &AccountId,
        metadata: CredentialMetadata,
    ) -> SourceResult<TxReceipt> {
        self.wait_for_gate().await;
        self.inner.mint_credential(owner, metadata).await
    }

    async fn update_credential(
        &self,
        owner: &AccountId,
        id: &CredentialId,
        patch: CredentialPatch,
    ) -> SourceResult<TxReceipt> {
        self.wait_for_gate().await;
        self.inner.update_credential(owner, id, patch).await
    }

    async fn delete_credential(
        &self,
        owner: &AccountId,
        id: &CredentialId,
    ) -> SourceResult<TxReceipt> {
        self.wait_for_gate().await;
        self.inner.delete_credential(owner, id).await
    }

    async fn network_info(&self) -> SourceResult<NetworkInfo> {
        self.inner.network_info().await
    }
}
