//! ForgeCred Cache - Query Cache and Mutation Coordination
//!
//! A keyed, TTL-based client cache with optimistic-update/rollback
//! semantics for credential mutations.
//!
//! # Design
//!
//! Reads route through [`QueryCache::read`] with explicit freshness
//! knobs: data within its stale time is served as-is, stale data is
//! served while revalidating in the background, and absent or
//! invalidated entries block on a deduplicated fetch. Mutations route
//! through [`MutationCoordinator`], which snapshots affected keys,
//! applies the expected result optimistically, rolls back verbatim on
//! failure, and invalidates on every settlement so the next read pulls
//! authoritative remote state.
//!
//! # Example
//!
//! ```ignore
//! let cache = Arc::new(QueryCache::new());
//! let coordinator = MutationCoordinator::new(Arc::clone(&cache), source);
//!
//! let owner = AccountId::new("5Alice");
//! let read = cache.read(
//!     &credentials_key(&owner),
//!     move || fetch_owner_credentials(owner.clone()),
//!     ReadOptions::default(),
//! ).await?;
//!
//! coordinator.mint(&owner, metadata).await?;
//! ```

pub mod entry;
pub mod key;
pub mod mutation;
pub mod query;
pub mod retry;

pub use entry::{CacheSnapshot, EntryState};
pub use key::{
    all_credentials_key, credential_key, credentials_key, network_info_key, CacheKey,
};
pub use mutation::{MutationCoordinator, MutationPhase};
pub use query::{
    CacheConfig, CacheError, CacheRead, CacheResult, CacheStats, CacheValue, QueryCache,
    ReadOptions,
};
pub use retry::RetryPolicy;
